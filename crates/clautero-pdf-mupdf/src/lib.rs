use std::path::Path;

use mupdf::{Document, TextPageFlags};

use clautero_core::{BackendError, PdfBackend};

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate isolates the mupdf dependency (AGPL-3.0) so the core crate
/// and its tests build without it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

fn open(path: &Path) -> Result<Document, BackendError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
    Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))
}

impl PdfBackend for MupdfBackend {
    fn page_count(&self, path: &Path) -> Result<usize, BackendError> {
        let document = open(path)?;
        let count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn extract_text(&self, path: &Path) -> Result<String, BackendError> {
        let document = open(path)?;
        let mut text = String::new();

        for page_result in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page_result.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

            // Pages are concatenated as-is; only lines get a separator.
            for block in text_page.blocks() {
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    text.push_str(&line_text);
                    text.push('\n');
                }
            }
        }

        Ok(text)
    }
}
