use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF reading backends.
///
/// Implementors provide the low-level page counting and text extraction;
/// the workflow decides what to do with the results.
pub trait PdfBackend: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<usize, BackendError>;

    /// Text of every page in page order, concatenated without separators.
    fn extract_text(&self, path: &Path) -> Result<String, BackendError>;
}

/// Extract the text of a PDF, logging and swallowing decoding errors so a
/// malformed document never aborts a batch.
pub fn extract_text(backend: &dyn PdfBackend, path: &Path) -> Option<String> {
    match backend.extract_text(path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "error extracting text from PDF");
            None
        }
    }
}
