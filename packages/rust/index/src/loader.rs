//! Source document loading.

use std::path::{Path, PathBuf};

use bcorag_shared::{BcoRagError, Result};
use tracing::{info, instrument};

/// A loaded source document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document identity (file stem), used to name the output directory.
    pub identity: String,
    /// Where the document was loaded from.
    pub path: PathBuf,
    /// Extracted plain text.
    pub text: String,
}

/// Load a paper from disk and extract its text.
///
/// PDFs go through `pdf-extract`; `.txt` and `.md` files are read as UTF-8.
/// A missing file or an unsupported extension is a configuration error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_document(path: &Path) -> Result<Document> {
    if !path.is_file() {
        return Err(BcoRagError::config(format!(
            "document not found: {}",
            path.display()
        )));
    }

    let identity = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| BcoRagError::config(format!("cannot derive a name from {}", path.display())))?;

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let text = match extension.as_str() {
        "pdf" => pdf_extract::extract_text(path)
            .map_err(|e| BcoRagError::document(path, format!("PDF extraction failed: {e}")))?,
        "txt" | "md" | "markdown" => {
            std::fs::read_to_string(path).map_err(|e| BcoRagError::io(path, e))?
        }
        other => {
            return Err(BcoRagError::config(format!(
                "unsupported document type '.{other}' (expected .pdf, .txt or .md)"
            )));
        }
    };

    if text.trim().is_empty() {
        return Err(BcoRagError::document(path, "no extractable text"));
    }

    info!(identity = %identity, chars = text.chars().count(), "document loaded");

    Ok(Document {
        identity,
        path: path.to_path_buf(),
        text,
    })
}
