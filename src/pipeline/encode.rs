//! Image encoding: `DynamicImage` → PNG bytes for the OCR engine.
//!
//! PNG is lossless; JPEG artefacts around glyph edges measurably hurt
//! tesseract accuracy. Alpha is flattened away first because tesseract
//! treats transparent pixels as black, turning blank margins into noise.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let opaque;
    let img = if img.color().has_alpha() {
        opaque = DynamicImage::ImageRgb8(img.to_rgb8());
        &opaque
    } else {
        img
    };
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;

    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
