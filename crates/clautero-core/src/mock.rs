//! In-memory test doubles for the library, the summarizer and the PDF
//! backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::backend::{BackendError, PdfBackend};
use crate::library::{LibraryClient, LibraryError, LibraryFuture};
use crate::summarize::{SummarizeError, SummarizeFuture, Summarizer};
use crate::{Attachment, Item, TagFilter};

/// A note written through [`MockLibrary::create_note`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedNote {
    pub parent_key: String,
    pub text: String,
    pub tags: Vec<String>,
}

/// A library call, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryCall {
    List { filter: TagFilter, limit: usize },
    GetItem(String),
    GetChildren(String),
    UpdateTags(String),
    CreateNote(String),
}

#[derive(Default)]
struct LibraryState {
    items: BTreeMap<String, Item>,
    children: BTreeMap<String, Vec<Attachment>>,
    notes: Vec<CreatedNote>,
    calls: Vec<LibraryCall>,
}

/// A hand-rolled in-memory reference manager.
///
/// Items are kept in key order; filtering follows [`TagFilter::matches`].
/// Every call is recorded and can be inspected with [`calls()`](MockLibrary::calls).
#[derive(Default)]
pub struct MockLibrary {
    state: Mutex<LibraryState>,
    /// When set, listing returns every match and ignores `limit`.
    ignore_limit: bool,
    /// When set, every tag write fails with HTTP 503.
    fail_writes: bool,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a server that does not honor the requested limit.
    pub fn ignoring_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    /// Simulate a server rejecting every tag write.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn with_item(self, item: Item, children: Vec<Attachment>) -> Self {
        self.insert(item, children);
        self
    }

    pub fn insert(&self, item: Item, children: Vec<Attachment>) {
        let mut state = self.state.lock().unwrap();
        state.children.insert(item.key.clone(), children);
        state.items.insert(item.key.clone(), item);
    }

    pub fn item(&self, key: &str) -> Option<Item> {
        self.state.lock().unwrap().items.get(key).cloned()
    }

    /// Tag names of `key`, sorted.
    pub fn tags_of(&self, key: &str) -> Vec<String> {
        let mut tags: Vec<String> = self
            .item(key)
            .map(|i| i.data.tags.into_iter().map(|t| t.tag).collect())
            .unwrap_or_default();
        tags.sort();
        tags
    }

    pub fn notes(&self) -> Vec<CreatedNote> {
        self.state.lock().unwrap().notes.clone()
    }

    pub fn calls(&self) -> Vec<LibraryCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of tag writes issued against `key`.
    pub fn tag_writes(&self, key: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LibraryCall::UpdateTags(k) if k == key))
            .count()
    }

    fn record(&self, call: LibraryCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl LibraryClient for MockLibrary {
    fn list_by_tag_filter<'a>(
        &'a self,
        filter: &'a TagFilter,
        limit: usize,
    ) -> LibraryFuture<'a, Vec<Item>> {
        self.record(LibraryCall::List {
            filter: filter.clone(),
            limit,
        });
        let state = self.state.lock().unwrap();
        let matching = state.items.values().filter(|i| filter.matches(&i.data));
        let items: Vec<Item> = if self.ignore_limit {
            matching.cloned().collect()
        } else {
            matching.take(limit).cloned().collect()
        };
        Box::pin(async move { Ok(items) })
    }

    fn get_item<'a>(&'a self, key: &'a str) -> LibraryFuture<'a, Item> {
        self.record(LibraryCall::GetItem(key.to_string()));
        let item = self.item(key);
        Box::pin(async move { item.ok_or_else(|| LibraryError::NotFound(key.to_string())) })
    }

    fn get_children<'a>(&'a self, key: &'a str) -> LibraryFuture<'a, Vec<Attachment>> {
        self.record(LibraryCall::GetChildren(key.to_string()));
        let children = self
            .state
            .lock()
            .unwrap()
            .children
            .get(key)
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(children) })
    }

    fn update_tags<'a>(&'a self, item: &'a Item) -> LibraryFuture<'a, ()> {
        self.record(LibraryCall::UpdateTags(item.key.clone()));
        if self.fail_writes {
            let key = item.key.clone();
            return Box::pin(async move {
                Err(LibraryError::Http {
                    status: 503,
                    url: format!("mock://items/{}", key),
                })
            });
        }
        let mut state = self.state.lock().unwrap();
        let result = match state.items.get_mut(&item.key) {
            Some(stored) if stored.version != item.version => Err(LibraryError::Conflict {
                key: item.key.clone(),
            }),
            Some(stored) => {
                stored.data.tags = item.data.tags.clone();
                stored.version += 1;
                Ok(())
            }
            None => Err(LibraryError::NotFound(item.key.clone())),
        };
        Box::pin(async move { result })
    }

    fn create_note<'a>(
        &'a self,
        parent_key: &'a str,
        text: &'a str,
        tags: &'a [String],
    ) -> LibraryFuture<'a, ()> {
        self.record(LibraryCall::CreateNote(parent_key.to_string()));
        self.state.lock().unwrap().notes.push(CreatedNote {
            parent_key: parent_key.to_string(),
            text: text.to_string(),
            tags: tags.to_vec(),
        });
        Box::pin(async move { Ok(()) })
    }
}

/// A summarizer that replies with a fixed text (or a fixed error) and
/// records the prompts it was sent.
pub struct MockSummarizer {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
    max_tokens: Mutex<Vec<u32>>,
    call_count: AtomicUsize,
}

impl MockSummarizer {
    pub fn replying(text: &str) -> Self {
        Self::with_reply(Ok(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_reply(Err(message.to_string()))
    }

    fn with_reply(reply: Result<String, String>) -> Self {
        Self {
            reply,
            prompts: Mutex::new(Vec::new()),
            max_tokens: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many times `complete()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn max_tokens_seen(&self) -> Vec<u32> {
        self.max_tokens.lock().unwrap().clone()
    }
}

impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> SummarizeFuture<'a> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.max_tokens.lock().unwrap().push(max_tokens);
        let reply = self.reply.clone();
        Box::pin(async move { reply.map_err(SummarizeError::Protocol) })
    }
}

/// A PDF backend reporting a fixed page count and text for any path.
///
/// Every path it is asked about is recorded; an optional delay blocks the
/// calling thread the way a real decoder would.
pub struct FixedPdf {
    pages: Option<usize>,
    text: String,
    delay: Option<Duration>,
    seen: Mutex<Vec<PathBuf>>,
}

impl FixedPdf {
    pub fn new(pages: usize, text: &str) -> Self {
        Self {
            pages: Some(pages),
            text: text.to_string(),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A backend that fails to open every document.
    pub fn unreadable() -> Self {
        Self {
            pages: None,
            ..Self::new(0, "")
        }
    }

    /// Block for `delay` (with `std::thread::sleep`) on every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Paths passed to `page_count` or `extract_text`, in call order.
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }

    fn visit(&self, path: &Path) {
        self.seen.lock().unwrap().push(path.to_path_buf());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }
}

impl PdfBackend for FixedPdf {
    fn page_count(&self, path: &Path) -> Result<usize, BackendError> {
        self.visit(path);
        self.pages
            .ok_or_else(|| BackendError::OpenError("unreadable fixture".into()))
    }

    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        self.visit(path);
        match self.pages {
            Some(_) => Ok(self.text.clone()),
            None => Err(BackendError::OpenError("unreadable fixture".into())),
        }
    }
}
