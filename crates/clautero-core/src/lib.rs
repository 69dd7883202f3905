use serde::{Deserialize, Serialize};

pub mod archive;
pub mod backend;
pub mod batch;
pub mod config;
pub mod config_file;
pub mod library;
pub mod logging;
pub mod mock;
pub mod summarize;
pub mod workflow;

// Re-export for convenience
pub use archive::{AttachmentResolver, TempPdf};
pub use backend::{BackendError, PdfBackend};
pub use batch::{BackfillReport, PassReport};
pub use config::{BackendKind, Config, ConfigError, PageBounds};
pub use config_file::{ConfigFile, ConfigFileError};
pub use library::{LibraryClient, LibraryError};
pub use summarize::{
    SummarizationClient, SummarizeError, Summarizer, SummaryError, extract_summary,
};
pub use workflow::{FailureKind, Outcome, Workflow};

/// Maximum number of items a single pass asks the library for.
pub const BATCH_LIMIT: usize = 50;

/// Content type an attachment must carry to be summarized.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// A single tag entry on a library item.
///
/// Zotero distinguishes manual (`type` absent or 0) from automatic (`type` 1)
/// tags; identity is the name alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u8>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            tag: name.into(),
            kind: None,
        }
    }
}

/// The `data` object of a library item.
///
/// Only the fields the workflow reads are typed; everything else is kept in
/// `extra` so an item survives a read/write cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(
        rename = "contentType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemData {
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.tag == name)
    }

    /// Add `name` unless already present. Returns whether the set changed.
    pub fn insert_tag(&mut self, name: &str) -> bool {
        if self.has_tag(name) {
            return false;
        }
        self.tags.push(Tag::new(name));
        true
    }

    /// Remove every entry named `name`, whatever its type. Returns whether
    /// the set changed.
    pub fn remove_tag(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.tag != name);
        self.tags.len() != before
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.tag.as_str()).collect()
    }
}

/// A bibliographic record in the reference manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub data: ItemData,
}

impl Item {
    pub fn new(key: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            key: key.into(),
            version: 0,
            data: ItemData {
                title: title.map(str::to_string),
                ..Default::default()
            },
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        for t in tags {
            self.data.insert_tag(t);
        }
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.data.title.as_deref()
    }
}

/// A child of an item. Only `application/pdf` children are summarized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub key: String,
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(key: impl Into<String>, content_type: Option<&str>) -> Self {
        Self {
            key: key.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    pub fn pdf(key: impl Into<String>) -> Self {
        Self::new(key, Some(PDF_CONTENT_TYPE))
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type.as_deref() == Some(PDF_CONTENT_TYPE)
    }
}

impl From<Item> for Attachment {
    fn from(item: Item) -> Self {
        Self {
            key: item.key,
            content_type: item.data.content_type,
        }
    }
}

/// The four tag names that encode workflow state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNames {
    pub todo: String,
    pub summarized: String,
    pub denied: String,
    pub error: String,
}

impl Default for TagNames {
    fn default() -> Self {
        Self {
            todo: "TODO".into(),
            summarized: "SUMMARIZED".into(),
            denied: "DENIED".into(),
            error: "ERROR".into(),
        }
    }
}

impl TagNames {
    /// Items waiting for a summary and not parked in ERROR or DENIED.
    pub fn pending_filter(&self) -> TagFilter {
        TagFilter {
            include: vec![self.todo.clone()],
            exclude: vec![self.error.clone(), self.denied.clone()],
        }
    }

    /// Items that carry none of the workflow tags yet.
    pub fn untracked_filter(&self) -> TagFilter {
        TagFilter {
            include: vec![],
            exclude: vec![
                self.todo.clone(),
                self.summarized.clone(),
                self.error.clone(),
                self.denied.clone(),
            ],
        }
    }
}

/// Inclusion/exclusion tag filter: an item matches when it carries every
/// `include` tag and none of the `exclude` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl TagFilter {
    pub fn matches(&self, data: &ItemData) -> bool {
        self.include.iter().all(|t| data.has_tag(t))
            && !self.exclude.iter().any(|t| data.has_tag(t))
    }

    /// Zotero search syntax: one `tag` parameter per condition, negated with
    /// a leading `-`. Parameters are ANDed by the server.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        self.include
            .iter()
            .map(|t| ("tag", t.clone()))
            .chain(self.exclude.iter().map(|t| ("tag", format!("-{}", t))))
            .collect()
    }
}
