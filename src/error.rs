//! Error types for the edgequake-pdf2ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2OcrError`]: **Fatal**: the run cannot proceed at all (missing
//!   file, not a PDF, wrong password, output not writable). Returned as
//!   `Err(Pdf2OcrError)` from the top-level `convert*` functions and never
//!   accompanied by a partial result.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed to render or to be
//!   recognised. Stored inside [`crate::output::PageResult`] so the rest of
//!   the document survives one bad page.
//!
//! The two collaborator boundaries report their own errors
//! ([`RasterizationError`], [`RecognitionError`]); the page processor turns
//! them into [`PageError`] data.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2ocr library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2OcrError {
    // ── Document-open errors ──────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: Vec<u8> },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The result could not be represented as JSON.
    #[error("Failed to serialise OCR result: {0}")]
    Serialization(String),

    // ── Run control ───────────────────────────────────────────────────────
    /// The caller cancelled the run before every page finished.
    #[error("Conversion cancelled after {completed}/{total} pages")]
    Cancelled { completed: usize, total: usize },

    /// The whole-run timeout elapsed before every page finished.
    #[error("Conversion timed out after {secs}s ({completed}/{total} pages done)\nIncrease --timeout.")]
    RunTimedOut {
        secs: u64,
        completed: usize,
        total: usize,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Pdf2OcrError {
    /// `true` for the errors meaning "the source document could not be opened".
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Pdf2OcrError::FileNotFound { .. }
                | Pdf2OcrError::PermissionDenied { .. }
                | Pdf2OcrError::NotAPdf { .. }
                | Pdf2OcrError::CorruptPdf { .. }
                | Pdf2OcrError::PasswordRequired { .. }
                | Pdf2OcrError::WrongPassword { .. }
                | Pdf2OcrError::PdfiumBindingFailed(_)
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageResult`] when a page fails and written to
/// the output file, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// The page could not be rendered to an image.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RasterizationFailed { page: usize, detail: String },

    /// The OCR engine failed on the rendered image.
    #[error("Page {page}: recognition failed: {detail}")]
    RecognitionFailed { page: usize, detail: String },

    /// The OCR engine did not finish within the per-page timeout.
    #[error("Page {page}: recognition timed out after {secs}s")]
    RecognitionTimeout { page: usize, secs: u64 },
}

impl PageError {
    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RasterizationFailed { page, .. }
            | PageError::RecognitionFailed { page, .. }
            | PageError::RecognitionTimeout { page, .. } => *page,
        }
    }
}

/// Failure reported by a [`crate::pipeline::render::OpenDocument`] for one page.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RasterizationError(pub String);

/// Failure reported by a [`crate::pipeline::recognize::TextRecognizer`].
#[derive(Debug, Clone, Error)]
pub enum RecognitionError {
    /// The OCR engine has no data for the requested language.
    #[error("language data for '{language}' is not installed: {detail}")]
    LanguageNotInstalled { language: String, detail: String },

    /// The OCR engine could not be started at all.
    #[error("OCR engine '{program}' could not be started: {detail}")]
    EngineUnavailable { program: String, detail: String },

    /// The OCR engine ran but reported an error.
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),
}
