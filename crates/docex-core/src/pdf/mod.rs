//! PDF rasterization.
//!
//! Pages are rendered with pdfium at a fixed oversampling factor so OCR and
//! the vision model see legible glyphs. When the pdfium library is not
//! available the embedded page images are used instead, which covers scanned
//! receipts and statements.

mod extractor;
mod render;

pub use extractor::EmbeddedImageExtractor;

use std::io::Cursor;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::PdfError;
use crate::models::config::PdfConfig;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Converts a PDF into ordered page images.
///
/// Implementations return `None` instead of failing: callers continue with
/// whatever image data they already have.
pub trait Rasterizer: Send + Sync {
    /// Rasterize PDF bytes.
    fn rasterize(&self, data: &[u8]) -> Option<Vec<DynamicImage>>;
}

/// Default rasterizer: pdfium rendering with an embedded-image fallback.
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    scale: f32,
    max_pages: usize,
}

impl PdfRasterizer {
    /// Oversampling factor balancing OCR legibility against payload size.
    pub const DEFAULT_SCALE: f32 = 3.0;

    pub fn new() -> Self {
        Self {
            scale: Self::DEFAULT_SCALE,
            max_pages: 0,
        }
    }

    pub fn from_config(config: &PdfConfig) -> Self {
        Self {
            scale: config.render_scale,
            max_pages: config.max_pages,
        }
    }

    fn page_limit(&self) -> usize {
        if self.max_pages == 0 {
            usize::MAX
        } else {
            self.max_pages
        }
    }

    fn embedded_images(&self, data: &[u8]) -> Result<Vec<DynamicImage>> {
        let mut extractor = EmbeddedImageExtractor::new();
        extractor.load(data)?;
        debug!("Looking for embedded images on {} pages", extractor.page_count());
        let mut images = extractor.page_images()?;
        images.truncate(self.page_limit());
        Ok(images)
    }
}

impl Default for PdfRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer for PdfRasterizer {
    fn rasterize(&self, data: &[u8]) -> Option<Vec<DynamicImage>> {
        let rendered = render::render_pages(data, self.scale, self.page_limit())
            .or_else(|e| {
                debug!("pdfium rendering unavailable ({}), using embedded images", e);
                self.embedded_images(data)
            });

        match rendered {
            Ok(pages) if !pages.is_empty() => {
                debug!("Rasterized {} pages", pages.len());
                Some(pages)
            }
            Ok(_) => {
                warn!("PDF produced no page images");
                None
            }
            Err(e) => {
                warn!("PDF rasterization failed: {}", e);
                None
            }
        }
    }
}

/// Encode an image as PNG bytes for transport.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
        .map_err(|e| PdfError::ImageExtraction(format!("PNG encode failed: {}", e)))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_corrupt_pdf_returns_none() {
        let rasterizer = PdfRasterizer::new();
        assert!(rasterizer.rasterize(b"%PDF-1.4 definitely not a pdf").is_none());
        assert!(rasterizer.rasterize(&[]).is_none());
    }

    #[test]
    fn test_page_limit() {
        assert_eq!(PdfRasterizer::new().page_limit(), usize::MAX);
        let from_config = PdfRasterizer::from_config(&PdfConfig::default());
        assert_eq!(from_config.scale, 3.0);
        assert_eq!(from_config.page_limit(), 20);
        let capped = PdfRasterizer::from_config(&PdfConfig {
            max_pages: 2,
            ..Default::default()
        });
        assert_eq!(capped.page_limit(), 2);
    }

    #[test]
    fn test_encode_png_roundtrip() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255])));
        let png = encode_png(&image).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }
}
