//! Document-level entry points: open, drive every page, assemble.
//!
//! ## Ordering under concurrency
//!
//! Pages run through `buffer_unordered`, so they finish in any order. Each
//! finished page drops into a slot indexed by its page number and the slots
//! are read back in order at the end; completion order never leaks into the
//! [`DocumentResult`]. Sequential and concurrent runs therefore produce the
//! same result.
//!
//! ## Cancellation
//!
//! Cancelling ([`convert_with_cancel`]) or hitting
//! [`OcrConfig::run_timeout_secs`] drops every in-flight page, which kills
//! the tesseract children and closes the document. It is a fatal error: a
//! partial [`DocumentResult`] is never returned.

use crate::config::OcrConfig;
use crate::error::Pdf2OcrError;
use crate::output::{self, ConversionOutput, ConversionStats, DocumentMetadata, DocumentResult};
use crate::pipeline::input;
use crate::pipeline::page::{self, ProcessedPage};
use crate::pipeline::recognize::{TesseractRecognizer, TextRecognizer};
use crate::pipeline::render::{OpenDocument, PageRasterizer, PdfiumRasterizer};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// OCR every page of a PDF.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(ConversionOutput)` whenever the document could be opened, even if
/// every page failed; per-page failures are recorded in
/// `output.document.pages`.
///
/// # Errors
/// Only fatal errors: the source cannot be opened (see
/// [`Pdf2OcrError::is_open_error`]) or the run timed out.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2ocr::{convert, OcrConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OcrConfig::builder("rus").build()?;
/// let output = convert("scan.pdf", &config).await?;
/// for page in &output.document.pages {
///     println!("--- page {} ---\n{}", page.page_num, page.text);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<ConversionOutput, Pdf2OcrError> {
    convert_with_cancel(input, config, std::future::pending()).await
}

/// Like [`convert`], but aborts with [`Pdf2OcrError::Cancelled`] as soon as
/// `cancel` completes.
///
/// ```rust,no_run
/// use edgequake_pdf2ocr::{convert_with_cancel, OcrConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OcrConfig::default();
/// let ctrl_c = async {
///     let _ = tokio::signal::ctrl_c().await;
/// };
/// let output = convert_with_cancel("scan.pdf", &config, ctrl_c).await?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_with_cancel(
    input: impl AsRef<Path>,
    config: &OcrConfig,
    cancel: impl Future<Output = ()>,
) -> Result<ConversionOutput, Pdf2OcrError> {
    let total_start = Instant::now();
    let source = input.as_ref();
    info!("Starting OCR: {} (language {})", source.display(), config.language);

    // ── Step 1: Open ─────────────────────────────────────────────────────
    let pdf_path = input::resolve_local(source)?;
    let rasterizer = resolve_rasterizer(config);
    let recognizer = resolve_recognizer(config);
    let document = rasterizer
        .open(&pdf_path, config.password.as_deref())
        .await?;
    let metadata = document.metadata().clone();
    let total_pages = document.page_count();

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total_pages);
    }

    // ── Step 2: Process pages ────────────────────────────────────────────
    let completed = AtomicUsize::new(0);
    let run = process_all(
        document.as_ref(),
        recognizer.as_ref(),
        total_pages,
        config,
        &completed,
    );
    let deadline = async {
        match config.run_timeout_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    let processed = tokio::select! {
        biased;
        processed = run => processed?,
        _ = cancel => {
            return Err(Pdf2OcrError::Cancelled {
                completed: completed.load(Ordering::SeqCst),
                total: total_pages,
            });
        }
        _ = deadline => {
            return Err(Pdf2OcrError::RunTimedOut {
                secs: config.run_timeout_secs.unwrap_or_default(),
                completed: completed.load(Ordering::SeqCst),
                total: total_pages,
            });
        }
    };
    drop(document);

    // ── Step 3: Assemble ─────────────────────────────────────────────────
    let mut stats = ConversionStats {
        total_pages,
        ..Default::default()
    };
    let mut pages = Vec::with_capacity(processed.len());
    for p in processed {
        stats.render_duration_ms += p.render_ms;
        stats.recognition_duration_ms += p.recognize_ms;
        pages.push(p.result);
    }

    let document = DocumentResult {
        source: source.display().to_string(),
        language: config.language.clone(),
        pages,
    };
    stats.succeeded_pages = document.succeeded_pages();
    stats.failed_pages = document.failed_pages();
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "OCR complete: {}/{} pages, {}ms total",
        stats.succeeded_pages, total_pages, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total_pages, stats.succeeded_pages);
    }

    Ok(ConversionOutput {
        document,
        metadata,
        stats,
    })
}

/// OCR a PDF and write the JSON result to `output_path`, or to
/// [`output::default_output_path`] next to the source when `None`.
///
/// The destination is checked with [`check_output_writable`] before any page
/// is processed. Returns the path written and the run statistics.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output_path: Option<&Path>,
    config: &OcrConfig,
) -> Result<(PathBuf, ConversionStats), Pdf2OcrError> {
    let input = input.as_ref();
    let path = output_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output::default_output_path(input));

    input::resolve_local(input)?;
    check_output_writable(&path).await?;

    let result = convert(input, config).await?;
    write_output(&path, &result.document, true).await?;
    Ok((path, result.stats))
}

/// Fail early with [`Pdf2OcrError::OutputWriteFailed`] when `path` could not
/// be written later.
///
/// Creates missing parent directories and briefly creates a scratch file
/// next to `path`. Nothing is left behind on success.
pub async fn check_output_writable(path: &Path) -> Result<(), Pdf2OcrError> {
    let write_err = |e: std::io::Error| Pdf2OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
        return Err(write_err(std::io::Error::other("output path is a directory")));
    }

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await.map_err(write_err)?;

    let scratch = tempfile::Builder::new()
        .prefix(".pdf2ocr-")
        .tempfile_in(parent)
        .map_err(write_err)?;
    drop(scratch);

    debug!("Output path {} is writable", path.display());
    Ok(())
}

/// Serialise `document` and write it to `path`.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a
/// truncated result behind.
pub async fn write_output(
    path: &Path,
    document: &DocumentResult,
    pretty: bool,
) -> Result<(), Pdf2OcrError> {
    let mut bytes = output::serialize(document, pretty)?;
    bytes.push(b'\n');

    let write_err = |e: std::io::Error| Pdf2OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<ConversionOutput, Pdf2OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config))
}

/// OCR PDF bytes held in memory.
///
/// The bytes are written to a managed [`tempfile`] that is removed on return.
/// The result's `source` is `"<memory>"`.
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &OcrConfig,
) -> Result<ConversionOutput, Pdf2OcrError> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| Pdf2OcrError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| Pdf2OcrError::Internal(format!("tempfile write: {e}")))?;

    let mut output = convert(tmp.path(), config).await?;
    output.document.source = "<memory>".to_string();
    Ok(output)
}

/// Read PDF metadata without running OCR.
///
/// Needs pdfium but not tesseract.
pub async fn inspect(
    input: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2OcrError> {
    let pdf_path = input::resolve_local(input.as_ref())?;
    let document = PdfiumRasterizer::new().open(&pdf_path, password).await?;
    Ok(document.metadata().clone())
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_rasterizer(config: &OcrConfig) -> Arc<dyn PageRasterizer> {
    match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::new()),
    }
}

fn resolve_recognizer(config: &OcrConfig) -> Arc<dyn TextRecognizer> {
    match config.recognizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(TesseractRecognizer::from_config(config)),
    }
}

/// Run every page through [`page::process_page`], at most
/// `config.concurrency` at a time, and return them in page order.
async fn process_all(
    document: &dyn OpenDocument,
    recognizer: &dyn TextRecognizer,
    total_pages: usize,
    config: &OcrConfig,
    completed: &AtomicUsize,
) -> Result<Vec<ProcessedPage>, Pdf2OcrError> {
    let mut slots: Vec<Option<ProcessedPage>> = vec![None; total_pages];

    let mut pages = stream::iter(1..=total_pages)
        .map(|page_num| async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page_num, total_pages);
            }
            let processed = page::process_page(document, recognizer, page_num, config).await;
            if let Some(ref cb) = config.progress_callback {
                match processed.result.error {
                    None => cb.on_page_complete(page_num, total_pages, processed.result.text.len()),
                    Some(ref e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                }
            }
            completed.fetch_add(1, Ordering::SeqCst);
            processed
        })
        .buffer_unordered(config.concurrency);

    while let Some(processed) = pages.next().await {
        let index = processed.result.page_num - 1;
        slots[index] = Some(processed);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| Pdf2OcrError::Internal(format!("page {} produced no result", i + 1)))
        })
        .collect()
}
