//! Locate the zip-wrapped PDF of an attachment and unpack it to a scoped
//! temporary file.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// A PDF unpacked from an attachment archive.
///
/// The file lives in the system temp directory and is deleted when this
/// value is dropped.
#[derive(Debug)]
pub struct TempPdf {
    file: NamedTempFile,
    /// Name of the entry inside the archive.
    pub entry_name: String,
}

impl TempPdf {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Resolves attachment keys to `{base_path}/{key}.zip` archives.
#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    base_path: PathBuf,
}

impl AttachmentResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn archive_path(&self, attachment_key: &str) -> PathBuf {
        self.base_path.join(format!("{}.zip", attachment_key))
    }

    /// Unpack the first PDF of the attachment's archive.
    ///
    /// Returns `None` when the archive is missing, unreadable, or holds no
    /// PDF entry.
    pub fn resolve(&self, attachment_key: &str) -> Option<TempPdf> {
        let path = self.archive_path(attachment_key);
        match extract_first_pdf(&path) {
            Ok(Some(pdf)) => {
                tracing::debug!(archive = %path.display(), entry = %pdf.entry_name, "unpacked PDF");
                Some(pdf)
            }
            Ok(None) => {
                tracing::warn!(archive = %path.display(), "archive contains no PDF");
                None
            }
            Err(e) => {
                tracing::warn!(archive = %path.display(), error = %e, "could not read archive");
                None
            }
        }
    }
}

/// Returns true if the entry name looks like a PDF.
fn is_pdf_name(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Copy the first `.pdf` entry of a ZIP archive into a temp file.
pub fn extract_first_pdf(archive_path: &Path) -> Result<Option<TempPdf>, String> {
    let file = std::fs::File::open(archive_path)
        .map_err(|e| format!("Failed to open archive {}: {}", archive_path.display(), e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("Failed to open ZIP: {}", e))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("Failed to read ZIP entry: {}", e))?;

        // Skip directories and macOS resource forks
        if entry.is_dir() || entry.name().contains("__MACOSX") {
            continue;
        }
        if !is_pdf_name(entry.name()) {
            continue;
        }

        let entry_name = entry.name().to_string();
        let mut buf = Vec::new();
        entry
            .read_to_end(&mut buf)
            .map_err(|e| format!("Failed to extract {}: {}", entry_name, e))?;

        let mut temp = tempfile::Builder::new()
            .prefix("clautero-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| format!("Failed to create temp file: {}", e))?;
        temp.write_all(&buf)
            .and_then(|_| temp.flush())
            .map_err(|e| format!("Failed to write {}: {}", entry_name, e))?;

        return Ok(Some(TempPdf {
            file: temp,
            entry_name,
        }));
    }

    Ok(None)
}
