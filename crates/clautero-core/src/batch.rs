//! Batch driver: one summarization pass, one tag backfill.

use std::fmt;

use crate::BATCH_LIMIT;
use crate::library::LibraryError;
use crate::workflow::{Outcome, Workflow};

/// Summary statistics for one summarization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub found: usize,
    pub summarized: usize,
    pub errored: usize,
    pub denied: usize,
    /// Per-item outcome in processing order.
    pub outcomes: Vec<(String, Outcome)>,
}

impl PassReport {
    fn record(&mut self, key: String, outcome: Outcome) {
        match outcome {
            Outcome::Summarized => self.summarized += 1,
            Outcome::Error(_) => self.errored += 1,
            Outcome::Denied(_) => self.denied += 1,
        }
        self.outcomes.push((key, outcome));
    }

    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} found, {} summarized, {} error, {} denied",
            self.found, self.summarized, self.errored, self.denied
        )
    }
}

/// Result of one tag backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub tagged: Vec<String>,
}

impl Workflow {
    /// Summarize up to [`BATCH_LIMIT`] items tagged TODO and not parked in
    /// ERROR or DENIED, one at a time.
    ///
    /// Item failures are tagged and counted; a library error aborts the pass.
    pub async fn run_summarization_pass(&self) -> Result<PassReport, LibraryError> {
        let filter = self.tags().pending_filter();
        let items = self
            .library()
            .list_by_tag_filter(&filter, BATCH_LIMIT)
            .await?;
        tracing::info!(count = items.len(), "found items to summarize");

        let mut report = PassReport {
            found: items.len(),
            ..Default::default()
        };
        for item in items.iter().take(BATCH_LIMIT) {
            let outcome = self.process(item).await?;
            report.record(item.key.clone(), outcome);
        }

        tracing::info!(
            summarized = report.summarized,
            errored = report.errored,
            denied = report.denied,
            "summarization pass finished"
        );
        Ok(report)
    }

    /// Tag up to [`BATCH_LIMIT`] items carrying none of the workflow tags
    /// with TODO, bringing new items into the pipeline.
    pub async fn run_tag_backfill(&self) -> Result<BackfillReport, LibraryError> {
        let filter = self.tags().untracked_filter();
        let items = self
            .library()
            .list_by_tag_filter(&filter, BATCH_LIMIT)
            .await?;
        tracing::info!(count = items.len(), "found untagged items");

        let mut report = BackfillReport::default();
        for item in items.iter().take(BATCH_LIMIT) {
            tracing::info!(item = %item.key, "adding TODO tag");
            self.library().add_tag(&item.key, &self.tags().todo).await?;
            report.tagged.push(item.key.clone());
        }
        Ok(report)
    }
}
