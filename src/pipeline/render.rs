//! PDF rasterisation: the [`PageRasterizer`] boundary and its pdfium adapter.
//!
//! ## One worker per document
//!
//! `pdfium-render` documents borrow the `Pdfium` bindings and are not `Send`,
//! and the pdfium C++ library is not safe to call from async contexts. The
//! adapter therefore opens each document on a `spawn_blocking` thread that
//! owns it for its whole lifetime and serves render requests over a bounded
//! channel. Rendering is serialised on that thread while recognition of
//! already-rendered pages proceeds concurrently. Dropping the
//! [`OpenDocument`] closes the channel, which ends the worker and closes the
//! document.

use crate::error::{Pdf2OcrError, RasterizationError};
use crate::output::DocumentMetadata;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Points-per-inch of PDF user space.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Render requests that may queue up behind the one being served.
const RENDER_QUEUE_DEPTH: usize = 4;

/// Rasterisation parameters for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Target resolution.
    pub dpi: u32,
    /// Cap on either output dimension in pixels.
    pub max_pixels: u32,
}

/// Opens PDF documents for page-by-page rasterisation.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Open `path`, failing with a document-open [`Pdf2OcrError`] if it cannot
    /// be parsed or decrypted.
    async fn open(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn OpenDocument>, Pdf2OcrError>;
}

/// A document opened by a [`PageRasterizer`]; read-only.
#[async_trait]
pub trait OpenDocument: Send + Sync {
    /// Metadata read when the document was opened.
    fn metadata(&self) -> &DocumentMetadata;

    /// Number of pages, in natural order.
    fn page_count(&self) -> usize {
        self.metadata().page_count
    }

    /// Render the page at 0-based `index`.
    async fn render_page(
        &self,
        index: usize,
        options: &RenderOptions,
    ) -> Result<DynamicImage, RasterizationError>;
}

// ── pdfium adapter ───────────────────────────────────────────────────────

/// [`PageRasterizer`] backed by pdfium.
///
/// The library is located via `PDFIUM_LIB_PATH`, then the platform library
/// name in the working directory, then the system library search path.
#[derive(Debug, Default, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the pdfium library at an explicit path.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn open(
        &self,
        path: &Path,
        password: Option<&str>,
    ) -> Result<Box<dyn OpenDocument>, Pdf2OcrError> {
        let (request_tx, request_rx) = mpsc::channel(RENDER_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel();
        let path = path.to_path_buf();
        let password = password.map(|s| s.to_string());
        let library_path = self.library_path.clone();

        // The worker outlives this call; it exits when `request_tx` is dropped.
        let worker_path = path.clone();
        tokio::task::spawn_blocking(move || {
            document_worker(library_path, worker_path, password, ready_tx, request_rx)
        });

        let metadata = await_opened(&path, ready_rx).await?;
        info!("PDF loaded: {} pages", metadata.page_count);

        Ok(Box::new(PdfiumDocument {
            metadata,
            requests: request_tx,
        }))
    }
}

/// The worker's answer to opening `path`. A worker that dies before answering
/// (a panic inside pdfium, say) counts as an unreadable document.
async fn await_opened(
    path: &Path,
    ready: oneshot::Receiver<Result<DocumentMetadata, Pdf2OcrError>>,
) -> Result<DocumentMetadata, Pdf2OcrError> {
    ready.await.unwrap_or_else(|_| {
        Err(Pdf2OcrError::CorruptPdf {
            path: path.to_path_buf(),
            detail: "pdfium worker exited before opening the document".into(),
        })
    })
}

struct RenderRequest {
    index: usize,
    options: RenderOptions,
    reply: oneshot::Sender<Result<DynamicImage, RasterizationError>>,
}

/// Handle to a document owned by a pdfium worker.
struct PdfiumDocument {
    metadata: DocumentMetadata,
    requests: mpsc::Sender<RenderRequest>,
}

#[async_trait]
impl OpenDocument for PdfiumDocument {
    fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    async fn render_page(
        &self,
        index: usize,
        options: &RenderOptions,
    ) -> Result<DynamicImage, RasterizationError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(RenderRequest {
                index,
                options: *options,
                reply,
            })
            .await
            .map_err(|_| RasterizationError("pdfium worker is gone".into()))?;
        response
            .await
            .map_err(|_| RasterizationError("pdfium worker dropped the request".into()))?
    }
}

/// Bind to pdfium: explicit path, `PDFIUM_LIB_PATH`, working directory, system.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, Pdf2OcrError> {
    let explicit = library_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    let bindings = match explicit {
        Some(path) => Pdfium::bind_to_library(&path)
            .map_err(|e| Pdf2OcrError::PdfiumBindingFailed(format!("{}: {e}", path.display())))?,
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Pdf2OcrError::PdfiumBindingFailed(e.to_string()))?,
    };
    Ok(Pdfium::new(bindings))
}

/// Blocking worker: open the document, report metadata, then serve renders.
fn document_worker(
    library_path: Option<PathBuf>,
    path: PathBuf,
    password: Option<String>,
    ready: oneshot::Sender<Result<DocumentMetadata, Pdf2OcrError>>,
    mut requests: mpsc::Receiver<RenderRequest>,
) {
    let pdfium = match bind_pdfium(library_path.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let document = match pdfium.load_pdf_from_file(&path, password.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready.send(Err(classify_load_error(&path, password.is_some(), &e)));
            return;
        }
    };

    if ready.send(Ok(read_metadata(&document))).is_err() {
        return;
    }

    while let Some(request) = requests.blocking_recv() {
        let result = catch_unwind(AssertUnwindSafe(|| {
            render_one(&document, request.index, &request.options)
        }))
        .unwrap_or_else(|_| Err(RasterizationError("pdfium panicked while rendering".into())));
        let _ = request.reply.send(result);
    }

    debug!("Closing {}", path.display());
}

fn classify_load_error(path: &Path, had_password: bool, e: &PdfiumError) -> Pdf2OcrError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            Pdf2OcrError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            Pdf2OcrError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        Pdf2OcrError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn render_one(
    document: &PdfDocument<'_>,
    index: usize,
    options: &RenderOptions,
) -> Result<DynamicImage, RasterizationError> {
    let pages = document.pages();
    let total = pages.len() as usize;
    if index >= total {
        return Err(RasterizationError(format!(
            "page index {index} out of range (document has {total} pages)"
        )));
    }

    let page = pages
        .get(index as u16)
        .map_err(|e| RasterizationError(format!("{:?}", e)))?;

    let max = options.max_pixels as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(options.dpi as f32 / PDF_POINTS_PER_INCH)
        .set_maximum_width(max)
        .set_maximum_height(max);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RasterizationError(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}

fn read_metadata(document: &PdfDocument<'_>) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}
