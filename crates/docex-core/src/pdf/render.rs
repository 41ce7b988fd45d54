//! Page rendering with pdfium.

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use tracing::trace;

use super::Result;
use crate::error::PdfError;

/// Render up to `limit` pages at `scale` times their natural size.
pub(super) fn render_pages(data: &[u8], scale: f32, limit: usize) -> Result<Vec<DynamicImage>> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PdfError::Render {
            page: 0,
            reason: format!("pdfium bind failed: {:?}", e),
        })?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(|e| PdfError::Parse(format!("{:?}", e)))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(PdfError::NoPages);
    }

    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let mut images = Vec::new();

    for (index, page) in pages.iter().enumerate().take(limit) {
        let page_number = index as u32 + 1;
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PdfError::Render {
                page: page_number,
                reason: format!("{:?}", e),
            })?;

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        trace!("Rendered page {} at {}x{}", page_number, width, height);

        let buffer = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or(
            PdfError::Render {
                page: page_number,
                reason: "bitmap size does not match its dimensions".to_string(),
            },
        )?;
        images.push(DynamicImage::ImageRgba8(buffer));
    }

    Ok(images)
}
