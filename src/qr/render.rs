//! PNG rendering of live tokens and scan links.

use image::Luma;
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use thiserror::Error;

pub const DEFAULT_PIXELS_PER_MODULE: u32 = 6;
pub const MAX_PIXELS_PER_MODULE: u32 = 40;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("QR generation failed: {0}")]
    Generation(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    Encoding(#[from] image::ImageError),
}

/// Text placed in the QR code: a scan link when `base_url` is set, the raw
/// token otherwise.
#[must_use]
pub fn scan_content(token: &str, base_url: Option<&str>) -> String {
    match base_url.map(str::trim).filter(|base| !base.is_empty()) {
        Some(base) => format!(
            "{}/?data={}",
            base.trim_end_matches('/'),
            urlencoding::encode(token)
        ),
        None => token.to_string(),
    }
}

#[must_use]
pub const fn clamp_pixels_per_module(pixels_per_module: u32) -> u32 {
    if pixels_per_module == 0 {
        1
    } else if pixels_per_module > MAX_PIXELS_PER_MODULE {
        MAX_PIXELS_PER_MODULE
    } else {
        pixels_per_module
    }
}

/// Renders `token` (wrapped into a scan link when `base_url` is set) as a
/// grayscale PNG with error-correction level M.
pub fn render_png(
    token: &str,
    base_url: Option<&str>,
    pixels_per_module: u32,
) -> Result<Vec<u8>, RenderError> {
    render_content_png(&scan_content(token, base_url), pixels_per_module)
}

/// Renders arbitrary content verbatim.
pub fn render_content_png(content: &str, pixels_per_module: u32) -> Result<Vec<u8>, RenderError> {
    let ppm = clamp_pixels_per_module(pixels_per_module);
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::M)?;
    let image = code.render::<Luma<u8>>().module_dimensions(ppm, ppm).build();

    let mut png_bytes = Vec::new();
    image::DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)?;

    Ok(png_bytes)
}
