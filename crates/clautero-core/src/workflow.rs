//! The per-item pipeline: validate, unpack, bound, summarize, annotate,
//! re-tag.

use std::fmt;
use std::sync::Arc;

use crate::archive::{AttachmentResolver, TempPdf};
use crate::backend::PdfBackend;
use crate::config::{Config, PageBounds};
use crate::library::{LibraryClient, LibraryError};
use crate::summarize::{SummarizationClient, Summarizer};
use crate::{Item, TagNames};

/// Why an item left the pipeline early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    MissingTitle,
    NoAttachments,
    /// Children exist but none is `application/pdf`.
    NotPdf,
    /// Archive missing, unreadable, or without a PDF entry.
    ArchiveUnresolved,
    /// The unpacked PDF could not be opened to count its pages.
    Unreadable,
    PageCount {
        pages: usize,
    },
    SummarizationFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTitle => write!(f, "missing title"),
            Self::NoAttachments => write!(f, "no attachments"),
            Self::NotPdf => write!(f, "no PDF attachment"),
            Self::ArchiveUnresolved => write!(f, "no PDF found in attachment archive"),
            Self::Unreadable => write!(f, "PDF could not be read"),
            Self::PageCount { pages } => write!(f, "page count {} out of bounds", pages),
            Self::SummarizationFailed => write!(f, "summarization failed"),
        }
    }
}

/// Terminal state of one item in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Note written, TODO replaced by SUMMARIZED.
    Summarized,
    /// Tagged ERROR: worth another look by an operator.
    Error(FailureKind),
    /// Tagged DENIED: permanently out of scope.
    Denied(FailureKind),
}

/// Everything one pass needs, built once and shared by the batch driver and
/// the web layer.
pub struct Workflow {
    library: Arc<dyn LibraryClient>,
    summarizer: SummarizationClient,
    resolver: AttachmentResolver,
    pdf: Arc<dyn PdfBackend>,
    tags: TagNames,
    model_name: String,
    page_bounds: PageBounds,
}

impl Workflow {
    pub fn new(
        library: Arc<dyn LibraryClient>,
        summarizer: SummarizationClient,
        resolver: AttachmentResolver,
        pdf: Arc<dyn PdfBackend>,
        tags: TagNames,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            library,
            summarizer,
            resolver,
            pdf,
            tags,
            model_name: model_name.into(),
            page_bounds: PageBounds::default(),
        }
    }

    pub fn with_page_bounds(mut self, bounds: PageBounds) -> Self {
        self.page_bounds = bounds;
        self
    }

    /// Wire a workflow from resolved configuration and concrete clients.
    pub fn from_config(
        config: &Config,
        library: Arc<dyn LibraryClient>,
        summarizer: Arc<dyn Summarizer>,
        pdf: Arc<dyn PdfBackend>,
    ) -> Self {
        let client = SummarizationClient::new(summarizer, pdf.clone(), &config.prompt_path);
        Self::new(
            library,
            client,
            AttachmentResolver::new(&config.file_path),
            pdf,
            config.tags.clone(),
            &config.model_name,
        )
        .with_page_bounds(config.page_bounds)
    }

    pub fn library(&self) -> &dyn LibraryClient {
        self.library.as_ref()
    }

    pub fn tags(&self) -> &TagNames {
        &self.tags
    }

    /// Run the pipeline on one item.
    ///
    /// Item-level failures are recorded as tags and returned as an
    /// [`Outcome`]; only library errors are returned as `Err`.
    pub async fn process(&self, item: &Item) -> Result<Outcome, LibraryError> {
        let key = item.key.as_str();

        let Some(title) = item.title() else {
            tracing::warn!(item = key, "skipping item because it has no title");
            return self.mark_error(key, FailureKind::MissingTitle).await;
        };

        tracing::info!(item = key, title, "searching attachments");
        let children = self.library.get_children(key).await?;
        tracing::info!(item = key, count = children.len(), "found attachments");
        if children.is_empty() {
            tracing::error!(item = key, title, "no attachments");
            return self.mark_error(key, FailureKind::NoAttachments).await;
        }

        let Some(attachment) = children.iter().find(|c| c.is_pdf()) else {
            tracing::error!(item = key, "no PDF attachment found, skipping");
            return self.mark_denied(key, FailureKind::NotPdf, false).await;
        };

        // Dropping `pdf` deletes the temp file on every path below.
        let (pdf, pages) = match self.unpack(key, &attachment.key).await {
            Ok(unpacked) => unpacked,
            Err(kind) => return self.mark_error(key, kind).await,
        };
        if !self.page_bounds.contains(pages) {
            tracing::error!(
                item = key,
                pages,
                min = self.page_bounds.min,
                max = self.page_bounds.max,
                "PDF length is out of bounds, skipping"
            );
            drop(pdf);
            return self
                .mark_denied(key, FailureKind::PageCount { pages }, true)
                .await;
        }

        let Some(summary) = self.summarizer.summarize(title, pdf.path()).await else {
            tracing::error!(item = key, "could not summarize item, skipping");
            return self.mark_error(key, FailureKind::SummarizationFailed).await;
        };

        let text = format!("Summary\n\n{}", summary);
        let note_tags = [self.model_name.clone(), self.tags.summarized.clone()];
        self.library.create_note(key, &text, &note_tags).await?;
        self.library
            .retag(key, &[self.tags.todo.as_str()], &[self.tags.summarized.as_str()])
            .await?;

        tracing::info!(item = key, title, "summarized");
        Ok(Outcome::Summarized)
    }

    /// Fetch `key` and run the pipeline on it.
    pub async fn process_key(&self, key: &str) -> Result<Outcome, LibraryError> {
        let item = self.library.get_item(key).await?;
        self.process(&item).await
    }

    /// Unzip the attachment and count its pages on the blocking pool (zip and
    /// MuPDF are not async). The temp file is dropped inside the task when
    /// the page count fails.
    async fn unpack(
        &self,
        item_key: &str,
        attachment_key: &str,
    ) -> Result<(TempPdf, usize), FailureKind> {
        let resolver = self.resolver.clone();
        let backend = Arc::clone(&self.pdf);
        let item_key = item_key.to_string();
        let attachment_key = attachment_key.to_string();

        tokio::task::spawn_blocking(move || {
            let Some(pdf) = resolver.resolve(&attachment_key) else {
                tracing::error!(item = %item_key, attachment = %attachment_key, "could not find a PDF in the archive, skipping");
                return Err(FailureKind::ArchiveUnresolved);
            };
            match backend.page_count(pdf.path()) {
                Ok(pages) => Ok((pdf, pages)),
                Err(e) => {
                    tracing::error!(item = %item_key, error = %e, "could not read PDF, skipping");
                    Err(FailureKind::Unreadable)
                }
            }
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "PDF task join error");
            Err(FailureKind::Unreadable)
        })
    }

    async fn mark_error(&self, key: &str, kind: FailureKind) -> Result<Outcome, LibraryError> {
        tracing::info!(item = key, reason = %kind, "setting error tag");
        self.library.add_tag(key, &self.tags.error).await?;
        Ok(Outcome::Error(kind))
    }

    async fn mark_denied(
        &self,
        key: &str,
        kind: FailureKind,
        strip_todo: bool,
    ) -> Result<Outcome, LibraryError> {
        tracing::info!(item = key, reason = %kind, "setting deny tag");
        if strip_todo {
            self.library
                .retag(key, &[self.tags.todo.as_str()], &[self.tags.denied.as_str()])
                .await?;
        } else {
            self.library.add_tag(key, &self.tags.denied).await?;
        }
        Ok(Outcome::Denied(kind))
    }
}
