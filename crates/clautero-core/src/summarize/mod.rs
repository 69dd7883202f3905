//! Language-model summarization of extracted paper text.

pub mod anthropic;
pub mod session;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::backend::{self, PdfBackend};
use crate::config::{BackendKind, Config};

pub use anthropic::AnthropicSummarizer;
pub use session::SessionSummarizer;

/// Generation cap for a single summary.
pub const MAX_TOKENS: u32 = 1024;

const PAPER_PLACEHOLDER: &str = "{{PAPER}}";

/// UTF-8 bullet decoded as Windows-1252, as some responses carry it.
const MISENCODED_BULLET: &str = "\u{e2}\u{20ac}\u{a2}";

static SUMMARY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<summary>(.*?)</summary>").unwrap());

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("failed to read prompt template {path}: {source}")]
    Prompt {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no text could be extracted from the PDF")]
    Extraction,
    #[error("PDF task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    #[error("No summary found inside <summary> tags.")]
    NotFound,
}

pub type SummarizeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, SummarizeError>> + Send + 'a>>;

/// A single-turn completion service.
pub trait Summarizer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Send `prompt` and return the text of the first response segment.
    fn complete<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> SummarizeFuture<'a>;
}

/// Build the summarizer selected by `config.backend`.
pub fn summarizer_from_config(config: &Config) -> Result<Arc<dyn Summarizer>, SummarizeError> {
    let timeout = std::time::Duration::from_secs(config.claude_timeout_secs);
    Ok(match config.backend {
        BackendKind::Api => {
            let key = config.claude_api_key.as_deref().unwrap_or_default();
            let mut s = AnthropicSummarizer::new(key, &config.model_name, timeout)?;
            if let Some(url) = &config.claude_base_url {
                s = s.with_base_url(url);
            }
            Arc::new(s)
        }
        BackendKind::Session => {
            let key = config.claude_session_key.as_deref().unwrap_or_default();
            let org = config.claude_organization_id.as_deref().unwrap_or_default();
            let mut s = SessionSummarizer::new(key, org, timeout)?;
            if let Some(url) = &config.claude_base_url {
                s = s.with_base_url(url);
            }
            Arc::new(s)
        }
    })
}

/// Content of the first `<summary>...</summary>` block, newlines included.
pub fn extract_summary(response: &str) -> Result<String, SummaryError> {
    SUMMARY_RE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(SummaryError::NotFound)
}

pub fn normalize_bullets(text: &str) -> String {
    text.replace(MISENCODED_BULLET, "-")
}

pub fn render_prompt(template: &str, paper: &str) -> String {
    template.replace(PAPER_PLACEHOLDER, paper)
}

/// Turns a PDF into a summary: prompt rendering, completion, extraction.
pub struct SummarizationClient {
    summarizer: Arc<dyn Summarizer>,
    pdf: Arc<dyn PdfBackend>,
    prompt_path: PathBuf,
}

impl SummarizationClient {
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        pdf: Arc<dyn PdfBackend>,
        prompt_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            summarizer,
            pdf,
            prompt_path: prompt_path.into(),
        }
    }

    /// Summarize the PDF at `pdf_path`. Every failure is logged and mapped
    /// to `None`.
    pub async fn summarize(&self, display_name: &str, pdf_path: &Path) -> Option<String> {
        match self.try_summarize(display_name, pdf_path).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::error!(item = display_name, error = %e, "error summarizing");
                None
            }
        }
    }

    /// Read the template and extract the PDF text on the blocking pool
    /// (MuPDF is not async).
    async fn build_prompt(&self, pdf_path: &Path) -> Result<String, SummarizeError> {
        let prompt_path = self.prompt_path.clone();
        let pdf = Arc::clone(&self.pdf);
        let pdf_path = pdf_path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<String, SummarizeError> {
            let template = std::fs::read_to_string(&prompt_path)
                .map_err(|source| SummarizeError::Prompt {
                    path: prompt_path.clone(),
                    source,
                })?;
            let text =
                backend::extract_text(pdf.as_ref(), &pdf_path).ok_or(SummarizeError::Extraction)?;
            Ok(render_prompt(&template, &text))
        })
        .await?
    }

    async fn try_summarize(
        &self,
        display_name: &str,
        pdf_path: &Path,
    ) -> Result<String, SummarizeError> {
        tracing::info!(
            item = display_name,
            backend = self.summarizer.name(),
            "sending for summarization"
        );
        let prompt = self.build_prompt(pdf_path).await?;

        let response = self.summarizer.complete(&prompt, MAX_TOKENS).await?;
        Ok(extract_summary(&normalize_bullets(&response))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FixedPdf, MockSummarizer};

    #[test]
    fn extracts_first_summary_block_across_lines() {
        let response = "blah <summary>- point one\n- point two</summary> blah <summary>second</summary>";
        assert_eq!(
            extract_summary(response).unwrap(),
            "- point one\n- point two"
        );
    }

    #[test]
    fn missing_tags_is_not_found() {
        assert_eq!(
            extract_summary("no tags here"),
            Err(SummaryError::NotFound)
        );
        assert_eq!(
            extract_summary("<summary>unterminated"),
            Err(SummaryError::NotFound)
        );
    }

    #[test]
    fn empty_summary_block_is_found() {
        assert_eq!(extract_summary("<summary></summary>").unwrap(), "");
    }

    #[test]
    fn misencoded_bullets_become_dashes() {
        assert_eq!(
            normalize_bullets("\u{e2}\u{20ac}\u{a2} one\n\u{e2}\u{20ac}\u{a2} two"),
            "- one\n- two"
        );
    }

    #[test]
    fn prompt_substitutes_every_placeholder() {
        assert_eq!(
            render_prompt("Read:\n{{PAPER}}\nAgain: {{PAPER}}", "TEXT"),
            "Read:\nTEXT\nAgain: TEXT"
        );
    }

    fn prompt_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "Summarize this paper:\n{{PAPER}}").unwrap();
        path
    }

    #[tokio::test]
    async fn summarize_sends_rendered_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let summarizer = Arc::new(MockSummarizer::replying(
            "ok <summary>\u{e2}\u{20ac}\u{a2} finding</summary>",
        ));
        let client = SummarizationClient::new(
            summarizer.clone(),
            Arc::new(FixedPdf::new(10, "THE PAPER TEXT")),
            prompt_file(&dir),
        );

        let summary = client.summarize("Paper A", Path::new("a.pdf")).await;
        assert_eq!(summary.as_deref(), Some("- finding"));
        assert_eq!(
            summarizer.prompts(),
            vec!["Summarize this paper:\nTHE PAPER TEXT".to_string()]
        );
        assert_eq!(summarizer.max_tokens_seen(), vec![MAX_TOKENS]);
    }

    #[tokio::test]
    async fn summarize_without_tags_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let client = SummarizationClient::new(
            Arc::new(MockSummarizer::replying("I could not find a summary.")),
            Arc::new(FixedPdf::new(10, "text")),
            prompt_file(&dir),
        );
        assert!(client.summarize("Paper A", Path::new("a.pdf")).await.is_none());
    }

    #[tokio::test]
    async fn summarize_with_missing_prompt_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let summarizer = Arc::new(MockSummarizer::replying("<summary>x</summary>"));
        let client = SummarizationClient::new(
            summarizer.clone(),
            Arc::new(FixedPdf::new(10, "text")),
            dir.path().join("missing.txt"),
        );
        assert!(client.summarize("Paper A", Path::new("a.pdf")).await.is_none());
        assert_eq!(summarizer.call_count(), 0);
    }

    #[tokio::test]
    async fn summarize_with_unreadable_pdf_skips_model_call() {
        let dir = tempfile::tempdir().unwrap();
        let summarizer = Arc::new(MockSummarizer::replying("<summary>x</summary>"));
        let client = SummarizationClient::new(
            summarizer.clone(),
            Arc::new(FixedPdf::unreadable()),
            prompt_file(&dir),
        );
        assert!(client.summarize("Paper A", Path::new("a.pdf")).await.is_none());
        assert_eq!(summarizer.call_count(), 0);
    }

    #[tokio::test]
    async fn summarize_service_error_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let client = SummarizationClient::new(
            Arc::new(MockSummarizer::failing("overloaded")),
            Arc::new(FixedPdf::new(10, "text")),
            prompt_file(&dir),
        );
        assert!(client.summarize("Paper A", Path::new("a.pdf")).await.is_none());
    }
}
