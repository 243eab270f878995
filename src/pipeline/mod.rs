//! Pipeline stages for PDF OCR.
//!
//! Each submodule implements exactly one step; the two external engines sit
//! behind traits so they can be swapped or faked.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ recognize ──▶ postprocess
//! (path)    (pdfium)   (PNG)      (tesseract)   (cleanup)
//!              └──────────── page ────────────────┘
//! ```
//!
//! 1. [`input`]     : validate the user-supplied path before any engine runs
//! 2. [`render`]    : [`render::PageRasterizer`] boundary and the pdfium adapter;
//!    one blocking worker owns each open document
//! 3. [`encode`]    : PNG-encode a rendered page for tesseract's stdin
//! 4. [`recognize`] : [`recognize::TextRecognizer`] boundary and the tesseract adapter
//! 5. [`postprocess`] : deterministic cleanup of engine output
//! 6. [`page`]      : one page end to end; never fails, only reports

pub mod encode;
pub mod input;
pub mod page;
pub mod postprocess;
pub mod recognize;
pub mod render;
