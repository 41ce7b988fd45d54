//! Embedded page image extraction using lopdf.

use image::{DynamicImage, ImageBuffer, Rgba};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::Result;
use crate::error::PdfError;

/// Pulls the scanned page images out of image-only PDFs.
pub struct EmbeddedImageExtractor {
    document: Option<Document>,
}

impl EmbeddedImageExtractor {
    pub fn new() -> Self {
        Self { document: None }
    }

    /// Load a PDF from bytes, decrypting empty-password documents.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        if doc.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }

        self.document = Some(doc);
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    /// One image per page, in page order. Pages without an image are skipped.
    ///
    /// Falls back to every image object in the document when no page
    /// references one through its resources.
    pub fn page_images(&self) -> Result<Vec<DynamicImage>> {
        let doc = self
            .document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("no document loaded".to_string()))?;

        let mut images = Vec::new();
        for (page_number, page_id) in doc.get_pages() {
            match self.first_page_image(doc, page_id) {
                Some(image) => images.push(image),
                None => trace!("No image XObject on page {}", page_number),
            }
        }

        if images.is_empty() {
            debug!("No page-level images found, scanning all objects");
            images = self.all_images(doc);
        }

        if images.is_empty() {
            return Err(PdfError::ImageExtraction(
                "no decodable images found in PDF".to_string(),
            ));
        }

        debug!("Extracted {} embedded page images", images.len());
        Ok(images)
    }

    fn first_page_image(&self, doc: &Document, page_id: ObjectId) -> Option<DynamicImage> {
        let resources = page_resources(doc, page_id)?;
        let xobjects = resources.get(b"XObject").ok()?;
        let Ok((_, Object::Dictionary(xobjects))) = doc.dereference(xobjects) else {
            return None;
        };

        xobjects.iter().find_map(|(_name, reference)| {
            let (_, object) = doc.dereference(reference).ok()?;
            decode_image_object(doc, object)
        })
    }

    fn all_images(&self, doc: &Document) -> Vec<DynamicImage> {
        doc.objects
            .values()
            .filter_map(|object| decode_image_object(doc, object))
            .collect()
    }
}

impl Default for EmbeddedImageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Resources dictionary for a page, following `Parent` inheritance.
fn page_resources(doc: &Document, node_id: ObjectId) -> Option<Dictionary> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
        return None;
    };

    if let Ok(resources) = dict.get(b"Resources") {
        if let Ok((_, Object::Dictionary(resources))) = doc.dereference(resources) {
            return Some(resources.clone());
        }
    }

    match dict.get(b"Parent") {
        Ok(Object::Reference(parent_id)) => page_resources(doc, *parent_id),
        _ => None,
    }
}

fn decode_image_object(doc: &Document, object: &Object) -> Option<DynamicImage> {
    let Object::Stream(stream) = object else {
        return None;
    };
    let dict = &stream.dict;

    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;
    trace!("Found image object: {}x{}", width, height);

    let filter = dict.get(b"Filter").ok().and_then(|filter| match filter {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
        _ => None,
    });

    match filter {
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Unsupported image filter");
            return None;
        }
        _ => {}
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let color_space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| match o {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
            Object::Reference(r) => doc.get_object(*r).ok().and_then(|o| o.as_name().ok()),
            _ => None,
        })
        .unwrap_or(b"DeviceRGB");

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);

    if bits != 8 {
        trace!("Unsupported bits per component: {}", bits);
        return None;
    }

    raw_to_rgba(&data, width, height, color_space)
}

fn raw_to_rgba(data: &[u8], width: u32, height: u32, color_space: &[u8]) -> Option<DynamicImage> {
    let pixels = (width as usize) * (height as usize);

    let rgba: Vec<u8> = match color_space {
        b"DeviceRGB" | b"RGB" if data.len() >= pixels * 3 => data[..pixels * 3]
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        b"DeviceGray" | b"G" if data.len() >= pixels => data[..pixels]
            .iter()
            .flat_map(|&gray| [gray, gray, gray, 255])
            .collect(),
        _ => {
            trace!(
                "Could not decode image: colorspace={:?}, data_len={}",
                String::from_utf8_lossy(color_space),
                data.len()
            );
            return None;
        }
    };

    ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, rgba).map(DynamicImage::ImageRgba8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_new() {
        let extractor = EmbeddedImageExtractor::new();
        assert!(extractor.document.is_none());
        assert_eq!(extractor.page_count(), 0);
        assert!(extractor.page_images().is_err());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let mut extractor = EmbeddedImageExtractor::new();
        assert!(matches!(
            extractor.load(b"not a pdf"),
            Err(PdfError::Parse(_))
        ));
    }

    #[test]
    fn test_raw_gray_to_rgba() {
        let image = raw_to_rgba(&[0, 128, 255, 64], 2, 2, b"DeviceGray").unwrap();
        let rgba = image.to_rgba8();
        assert_eq!(rgba.get_pixel(1, 0).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_raw_rgb_too_short() {
        assert!(raw_to_rgba(&[1, 2, 3], 2, 2, b"DeviceRGB").is_none());
        assert!(raw_to_rgba(&[1, 2, 3, 4], 1, 1, b"DeviceCMYK").is_none());
    }
}
