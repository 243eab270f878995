//! # edgequake-pdf2ocr
//!
//! OCR scanned PDF documents page by page with Tesseract.
//!
//! ## Why this crate?
//!
//! Scanned PDFs carry no text layer, so `pdftotext` and friends return
//! nothing. This crate rasterises every page with pdfium, hands the image to
//! the `tesseract` engine in the requested language, and collects the text
//! into one JSON document keyed by page number. A page that cannot be
//! rendered or recognised is recorded as failed; the rest of the document
//! is still produced.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate the local file (exists, readable, %PDF magic)
//!  ├─ 2. Render     rasterise one page via pdfium (dedicated blocking worker)
//!  ├─ 3. Recognise  PNG → `tesseract stdin stdout -l <lang>` (bounded pool)
//!  ├─ 4. Clean      normalise line endings and whitespace
//!  └─ 5. Output     {"source", "language", "total_pages", "pages": {"1": {...}, ...}, "errors"}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2ocr::{convert, OcrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder("rus+eng").dpi(300).build()?;
//!     let output = convert("scan.pdf", &config).await?;
//!     std::fs::write("scan.ocr.json", output.document.to_json()?)?;
//!     eprintln!("{}/{} pages recognised",
//!         output.stats.succeeded_pages,
//!         output.stats.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Native requirements
//!
//! * libpdfium: `PDFIUM_LIB_PATH`, the working directory, or the system
//!   library path.
//! * `tesseract` on `PATH` (or [`OcrConfigBuilder::tesseract_path`]) with the
//!   `*.traineddata` pack for every requested language.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineMode, OcrConfig, OcrConfigBuilder, PageSegMode};
pub use convert::{
    check_output_writable, convert, convert_from_bytes, convert_sync, convert_to_file,
    convert_with_cancel, inspect, write_output,
};
pub use error::{PageError, Pdf2OcrError, RasterizationError, RecognitionError};
pub use output::{
    default_output_path, ConversionOutput, ConversionStats, DocumentMetadata, DocumentResult,
    PageResult, PageStatus, OUTPUT_SUFFIX,
};
pub use pipeline::recognize::{RecognizeOptions, TesseractRecognizer, TextRecognizer};
pub use pipeline::render::{OpenDocument, PageRasterizer, PdfiumRasterizer, RenderOptions};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
