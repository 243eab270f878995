//! Input validation: check a user-supplied path before any engine touches it.
//!
//! pdfium reports a missing file, a permission problem and a JPEG renamed to
//! `.pdf` with the same opaque load error. Checking existence, readability
//! and the `%PDF` magic bytes up front turns those into distinct, actionable
//! [`Pdf2OcrError`]s.

use crate::error::Pdf2OcrError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes every PDF file starts with.
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Validate a local PDF path: it must exist, be readable and start with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<PathBuf, Pdf2OcrError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(Pdf2OcrError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(f) => {
            let mut magic = Vec::with_capacity(PDF_MAGIC.len());
            f.take(PDF_MAGIC.len() as u64)
                .read_to_end(&mut magic)
                .map_err(|e| Pdf2OcrError::CorruptPdf {
                    path: path.clone(),
                    detail: format!("cannot read header: {e}"),
                })?;
            if magic.as_slice() != PDF_MAGIC {
                return Err(Pdf2OcrError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2OcrError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2OcrError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
