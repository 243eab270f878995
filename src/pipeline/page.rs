//! Single-page processing: render → recognise → [`PageResult`].
//!
//! [`process_page`] is total. Every failure, including a panic inside either
//! collaborator, is captured into the returned [`PageResult`] so one bad page
//! can never take the rest of the document down with it.

use crate::config::OcrConfig;
use crate::error::PageError;
use crate::output::PageResult;
use crate::pipeline::postprocess::clean_text;
use crate::pipeline::recognize::{RecognizeOptions, TextRecognizer};
use crate::pipeline::render::{OpenDocument, RenderOptions};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A page result plus how long each stage took.
#[derive(Debug, Clone)]
pub struct ProcessedPage {
    pub result: PageResult,
    pub render_ms: u64,
    pub recognize_ms: u64,
}

/// Process the page with 1-based number `page_num`.
///
/// A page that fails to render is never handed to the recogniser. Rendering
/// and recognition each get `config.page_timeout_secs`.
pub async fn process_page(
    document: &dyn OpenDocument,
    recognizer: &dyn TextRecognizer,
    page_num: usize,
    config: &OcrConfig,
) -> ProcessedPage {
    let render_options = RenderOptions {
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
    };

    let page_timeout = Duration::from_secs(config.page_timeout_secs);
    let render_start = Instant::now();
    let rendered = tokio::time::timeout(
        page_timeout,
        AssertUnwindSafe(document.render_page(page_num - 1, &render_options)).catch_unwind(),
    )
    .await;
    let render_ms = render_start.elapsed().as_millis() as u64;

    let rendered = match rendered {
        Ok(rendered) => rendered,
        Err(_) => {
            warn!("Page {}: rasterisation timed out", page_num);
            return failed(
                PageError::RasterizationFailed {
                    page: page_num,
                    detail: format!("rendering timed out after {}s", config.page_timeout_secs),
                },
                render_ms,
                0,
            );
        }
    };

    let image = match rendered {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => {
            warn!("Page {}: rasterisation failed: {}", page_num, e);
            return failed(
                PageError::RasterizationFailed {
                    page: page_num,
                    detail: e.to_string(),
                },
                render_ms,
                0,
            );
        }
        Err(_) => {
            warn!("Page {}: renderer panicked", page_num);
            return failed(
                PageError::RasterizationFailed {
                    page: page_num,
                    detail: "renderer panicked".into(),
                },
                render_ms,
                0,
            );
        }
    };

    let options = RecognizeOptions::from_config(config);
    let recognize_start = Instant::now();
    let recognised = tokio::time::timeout(
        page_timeout,
        AssertUnwindSafe(recognizer.recognize(&image, &options)).catch_unwind(),
    )
    .await;
    let recognize_ms = recognize_start.elapsed().as_millis() as u64;
    drop(image);

    let error = match recognised {
        Ok(Ok(Ok(raw))) => {
            let text = clean_text(&raw);
            debug!(
                "Page {}: {} chars in {}ms (render {}ms)",
                page_num,
                text.chars().count(),
                recognize_ms,
                render_ms
            );
            return ProcessedPage {
                result: PageResult::success(page_num, text),
                render_ms,
                recognize_ms,
            };
        }
        Ok(Ok(Err(e))) => PageError::RecognitionFailed {
            page: page_num,
            detail: e.to_string(),
        },
        Ok(Err(_)) => PageError::RecognitionFailed {
            page: page_num,
            detail: "recogniser panicked".into(),
        },
        Err(_) => PageError::RecognitionTimeout {
            page: page_num,
            secs: config.page_timeout_secs,
        },
    };

    warn!("{}", error);
    failed(error, render_ms, recognize_ms)
}

fn failed(error: PageError, render_ms: u64, recognize_ms: u64) -> ProcessedPage {
    ProcessedPage {
        result: PageResult::failed(error),
        render_ms,
        recognize_ms,
    }
}
