//! End-to-end tests of the per-item workflow and the batch driver.
//!
//! The library, the summarizer and the PDF backend are in-memory doubles;
//! attachment archives are real zip files in a temp directory.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clautero_core::mock::{FixedPdf, LibraryCall, MockLibrary, MockSummarizer};
use clautero_core::{
    Attachment, AttachmentResolver, BATCH_LIMIT, FailureKind, Item, LibraryError, Outcome,
    SummarizationClient, TagNames, Workflow,
};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const MODEL: &str = "claude-3-opus-20240229";

struct Fixture {
    _dir: TempDir,
    library: Arc<MockLibrary>,
    summarizer: Arc<MockSummarizer>,
    pdf: Arc<FixedPdf>,
    workflow: Workflow,
}

fn write_zip(storage: &Path, key: &str, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(storage.join(format!("{key}.zip"))).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Build a workflow over `library`, with archives for `archived` keys.
fn fixture(library: MockLibrary, reply: &str, pdf: FixedPdf, archived: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let storage = dir.path().join("storage");
    std::fs::create_dir(&storage).unwrap();
    for key in archived {
        write_zip(&storage, key, &[("a.pdf", b"%PDF-1.4 fixture")]);
    }
    let prompt = dir.path().join("prompt.txt");
    std::fs::write(&prompt, "Summarize:\n{{PAPER}}").unwrap();

    let library = Arc::new(library);
    let summarizer = Arc::new(MockSummarizer::replying(reply));
    let pdf = Arc::new(pdf);
    let workflow = Workflow::new(
        library.clone(),
        SummarizationClient::new(summarizer.clone(), pdf.clone(), prompt),
        AttachmentResolver::new(storage),
        pdf.clone(),
        TagNames::default(),
        MODEL,
    );

    Fixture {
        _dir: dir,
        library,
        summarizer,
        pdf,
        workflow,
    }
}

fn todo_item(key: &str, title: Option<&str>) -> Item {
    Item::new(key, title).with_tags(&["TODO"])
}

const GOOD_REPLY: &str = "blah <summary>- point one\n- point two</summary> blah";

// ── Per-item gates ──────────────────────────────────────────────

#[tokio::test]
async fn missing_title_is_error_without_further_calls() {
    let library = MockLibrary::new().with_item(todo_item("K1", None), vec![Attachment::pdf("A1")]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "text"), &["A1"]);

    let item = f.library.item("K1").unwrap();
    let outcome = f.workflow.process(&item).await.unwrap();

    assert_eq!(outcome, Outcome::Error(FailureKind::MissingTitle));
    assert_eq!(f.library.tags_of("K1"), vec!["ERROR", "TODO"]);
    assert!(
        !f.library
            .calls()
            .iter()
            .any(|c| matches!(c, LibraryCall::GetChildren(_)))
    );
    assert_eq!(f.summarizer.call_count(), 0);
    assert!(f.library.notes().is_empty());
}

#[tokio::test]
async fn no_children_is_error() {
    let library = MockLibrary::new().with_item(todo_item("K1", Some("Paper A")), vec![]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "text"), &[]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Error(FailureKind::NoAttachments));
    assert_eq!(f.library.tags_of("K1"), vec!["ERROR", "TODO"]);
}

#[tokio::test]
async fn non_pdf_children_are_denied_not_error() {
    let library = MockLibrary::new().with_item(
        todo_item("K1", Some("Paper A")),
        vec![
            Attachment::new("A1", Some("text/html")),
            Attachment::new("A2", None),
        ],
    );
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "text"), &["A1"]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Denied(FailureKind::NotPdf));
    // TODO stays: the exclusion filter already keeps DENIED items out.
    assert_eq!(f.library.tags_of("K1"), vec!["DENIED", "TODO"]);
    assert_eq!(f.summarizer.call_count(), 0);
}

#[tokio::test]
async fn first_pdf_child_is_selected() {
    let library = MockLibrary::new().with_item(
        todo_item("K1", Some("Paper A")),
        vec![
            Attachment::new("HTML", Some("text/html")),
            Attachment::pdf("A1"),
            Attachment::pdf("A2"),
        ],
    );
    // Only A1 has an archive; selecting A2 would fail with ArchiveUnresolved.
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "text"), &["A1"]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Summarized);
}

#[tokio::test]
async fn missing_archive_is_error() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "text"), &[]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Error(FailureKind::ArchiveUnresolved));
    assert_eq!(f.library.tags_of("K1"), vec!["ERROR", "TODO"]);
}

#[tokio::test]
async fn unreadable_pdf_is_error() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::unreadable(), &["A1"]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Error(FailureKind::Unreadable));
    assert_eq!(f.summarizer.call_count(), 0);
}

#[tokio::test]
async fn page_count_out_of_bounds_is_denied_and_strips_todo() {
    for pages in [0, 4, 61, 300] {
        let item = todo_item("K1", Some("Paper A")).with_tags(&["reading-list"]);
        let library = MockLibrary::new().with_item(item, vec![Attachment::pdf("A1")]);
        let f = fixture(library, GOOD_REPLY, FixedPdf::new(pages, "text"), &["A1"]);

        let outcome = f.workflow.process_key("K1").await.unwrap();
        assert_eq!(outcome, Outcome::Denied(FailureKind::PageCount { pages }));
        assert_eq!(f.library.tags_of("K1"), vec!["DENIED", "reading-list"]);
        assert_eq!(f.summarizer.call_count(), 0);
        assert!(f.library.notes().is_empty());
    }
}

#[tokio::test]
async fn page_count_bounds_are_inclusive() {
    for pages in [5, 60] {
        let library = MockLibrary::new()
            .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
        let f = fixture(library, GOOD_REPLY, FixedPdf::new(pages, "text"), &["A1"]);
        assert_eq!(
            f.workflow.process_key("K1").await.unwrap(),
            Outcome::Summarized
        );
    }
}

#[tokio::test]
async fn reply_without_summary_tags_is_error_without_note() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let f = fixture(
        library,
        "Here is a summary: - point one",
        FixedPdf::new(10, "text"),
        &["A1"],
    );

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Error(FailureKind::SummarizationFailed));
    assert_eq!(f.summarizer.call_count(), 1);
    assert!(f.library.notes().is_empty());
    assert_eq!(f.library.tags_of("K1"), vec!["ERROR", "TODO"]);
}

// ── Happy path ──────────────────────────────────────────────────

#[tokio::test]
async fn paper_a_end_to_end() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "FULL TEXT"), &["A1"]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Summarized);

    let notes = f.library.notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].parent_key, "K1");
    assert_eq!(notes[0].text, "Summary\n\n- point one\n- point two");
    assert_eq!(notes[0].tags, vec![MODEL.to_string(), "SUMMARIZED".to_string()]);

    assert_eq!(f.library.tags_of("K1"), vec!["SUMMARIZED"]);
    // TODO removal and SUMMARIZED addition land in a single write.
    assert_eq!(f.library.tag_writes("K1"), 1);
    assert_eq!(f.summarizer.prompts(), vec!["Summarize:\nFULL TEXT".to_string()]);
}

// ── Temp files and blocking work ────────────────────────────────

fn assert_temp_pdfs_removed(f: &Fixture) {
    let seen = f.pdf.seen_paths();
    assert!(!seen.is_empty());
    for path in seen {
        assert!(!path.exists(), "{} was left behind", path.display());
    }
}

#[tokio::test]
async fn temp_pdf_is_removed_after_page_count_denial() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(61, "text"), &["A1"]);

    let outcome = f.workflow.process_key("K1").await.unwrap();
    assert_eq!(outcome, Outcome::Denied(FailureKind::PageCount { pages: 61 }));
    assert_temp_pdfs_removed(&f);
}

#[tokio::test]
async fn temp_pdf_is_removed_after_unreadable_pdf() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::unreadable(), &["A1"]);

    f.workflow.process_key("K1").await.unwrap();
    assert_temp_pdfs_removed(&f);
}

#[tokio::test]
async fn temp_pdf_is_removed_after_summary_failure_and_success() {
    for reply in ["no tags", GOOD_REPLY] {
        let library = MockLibrary::new()
            .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
        let f = fixture(library, reply, FixedPdf::new(10, "text"), &["A1"]);

        f.workflow.process_key("K1").await.unwrap();
        // page_count and extract_text both saw the same unpacked file.
        assert_eq!(f.pdf.seen_paths().len(), 2);
        assert_temp_pdfs_removed(&f);
    }
}

#[tokio::test]
async fn slow_pdf_backend_does_not_stall_the_runtime() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")]);
    let pdf = FixedPdf::new(10, "text").with_delay(Duration::from_millis(150));
    let f = fixture(library, GOOD_REPLY, pdf, &["A1"]);

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    let outcome = f.workflow.process_key("K1").await.unwrap();
    ticker.abort();

    assert_eq!(outcome, Outcome::Summarized);
    assert!(ticks.load(Ordering::SeqCst) > 0);
}

// ── Batch driver ────────────────────────────────────────────────

#[tokio::test]
async fn pass_queries_pending_filter_with_limit_50() {
    let f = fixture(MockLibrary::new(), GOOD_REPLY, FixedPdf::new(10, "t"), &[]);

    let report = f.workflow.run_summarization_pass().await.unwrap();
    assert_eq!(report.found, 0);
    assert_eq!(
        f.library.calls(),
        vec![LibraryCall::List {
            filter: TagNames::default().pending_filter(),
            limit: 50,
        }]
    );
}

#[tokio::test]
async fn pass_processes_at_most_50_of_51() {
    let library = MockLibrary::new().ignoring_limit();
    for i in 0..51 {
        library.insert(todo_item(&format!("K{i:02}"), None), vec![]);
    }
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "t"), &[]);

    let report = f.workflow.run_summarization_pass().await.unwrap();
    assert_eq!(report.found, 51);
    assert_eq!(report.processed(), BATCH_LIMIT);
    assert_eq!(report.errored, 50);
    assert_eq!(f.library.tags_of("K50"), vec!["TODO"]);
}

#[tokio::test]
async fn pass_skips_parked_items_and_continues_after_failures() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", None), vec![])
        .with_item(todo_item("K2", Some("Paper A")), vec![Attachment::pdf("A2")])
        .with_item(
            todo_item("K3", Some("Paper B")),
            vec![Attachment::new("A3", Some("text/html"))],
        )
        .with_item(
            todo_item("K4", Some("Parked")).with_tags(&["ERROR"]),
            vec![Attachment::pdf("A4")],
        )
        .with_item(
            Item::new("K5", Some("Untracked")),
            vec![Attachment::pdf("A5")],
        );
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "t"), &["A2", "A4", "A5"]);

    let report = f.workflow.run_summarization_pass().await.unwrap();
    assert_eq!(report.found, 3);
    assert_eq!(
        (report.summarized, report.errored, report.denied),
        (1, 1, 1)
    );
    assert_eq!(
        report.outcomes,
        vec![
            ("K1".to_string(), Outcome::Error(FailureKind::MissingTitle)),
            ("K2".to_string(), Outcome::Summarized),
            ("K3".to_string(), Outcome::Denied(FailureKind::NotPdf)),
        ]
    );
    assert_eq!(f.library.tags_of("K4"), vec!["ERROR", "TODO"]);
    assert!(f.library.tags_of("K5").is_empty());
}

#[tokio::test]
async fn second_pass_does_not_reselect_finished_items() {
    let library = MockLibrary::new()
        .with_item(todo_item("K1", Some("Paper A")), vec![Attachment::pdf("A1")])
        .with_item(todo_item("K2", Some("Paper B")), vec![]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "t"), &["A1"]);

    let first = f.workflow.run_summarization_pass().await.unwrap();
    assert_eq!(first.found, 2);
    let second = f.workflow.run_summarization_pass().await.unwrap();
    assert_eq!(second.found, 0);
    assert_eq!(f.summarizer.call_count(), 1);
    assert_eq!(f.library.notes().len(), 1);
}

#[tokio::test]
async fn library_error_aborts_pass() {
    let library = MockLibrary::new()
        .failing_writes()
        .with_item(todo_item("K1", None), vec![])
        .with_item(todo_item("K2", None), vec![]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "t"), &[]);

    let err = f.workflow.run_summarization_pass().await.unwrap_err();
    assert!(matches!(err, LibraryError::Http { status: 503, .. }));
    assert_eq!(f.library.tag_writes("K2"), 0);
}

#[tokio::test]
async fn backfill_tags_untracked_items_once() {
    let library = MockLibrary::new()
        .with_item(Item::new("K1", Some("New A")), vec![])
        .with_item(Item::new("K2", Some("New B")).with_tags(&["misc"]), vec![])
        .with_item(Item::new("K3", Some("Done")).with_tags(&["SUMMARIZED"]), vec![])
        .with_item(Item::new("K4", Some("Parked")).with_tags(&["DENIED"]), vec![]);
    let f = fixture(library, GOOD_REPLY, FixedPdf::new(10, "t"), &[]);

    let first = f.workflow.run_tag_backfill().await.unwrap();
    assert_eq!(first.tagged, vec!["K1".to_string(), "K2".to_string()]);
    let second = f.workflow.run_tag_backfill().await.unwrap();
    assert!(second.tagged.is_empty());

    assert_eq!(f.library.tags_of("K1"), vec!["TODO"]);
    assert_eq!(f.library.tags_of("K2"), vec!["TODO", "misc"]);
    assert_eq!(f.library.tag_writes("K1"), 1);
    assert_eq!(f.library.tag_writes("K3"), 0);
    assert!(f.library.calls().contains(&LibraryCall::List {
        filter: TagNames::default().untracked_filter(),
        limit: 50,
    }));
}
