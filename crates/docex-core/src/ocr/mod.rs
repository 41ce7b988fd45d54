//! Page-level OCR with concurrent fan-out.

#[cfg(feature = "native-ocr")]
mod pure_engine;

#[cfg(feature = "native-ocr")]
pub use pure_engine::PureOcrEngine;

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::OcrError;

/// Recognizes the text of a single page image.
///
/// Implementations are called from blocking worker threads, one page per call.
pub trait PageRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Progress report for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrProgress {
    /// 1-based page number.
    pub page: usize,
    pub total: usize,
    /// Fraction of this page completed, in [0, 1].
    pub progress: f32,
    pub status: &'static str,
}

pub const STATUS_RECOGNIZING: &str = "recognizing text";
pub const STATUS_DONE: &str = "done";
pub const STATUS_FAILED: &str = "failed";

/// A detected text region with its axis-aligned rectangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBox {
    /// (min_x, min_y, max_x, max_y)
    pub rect: (f32, f32, f32, f32),
    pub text: String,
    pub confidence: f32,
}

/// Sort boxes top-to-bottom, then left-to-right within ~20px rows, and join
/// their text with newlines.
pub fn reading_order_text(mut boxes: Vec<TextBox>) -> String {
    boxes.sort_by(|a, b| {
        let row_a = (a.rect.1 / 20.0) as i32;
        let row_b = (b.rect.1 / 20.0) as i32;
        if row_a != row_b {
            row_a.cmp(&row_b)
        } else {
            a.rect
                .0
                .partial_cmp(&b.rect.0)
                .unwrap_or(std::cmp::Ordering::Equal)
        }
    });

    boxes
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs a [`PageRecognizer`] over every page of a document concurrently.
#[derive(Clone)]
pub struct OcrEngine {
    recognizer: Arc<dyn PageRecognizer>,
}

impl OcrEngine {
    pub fn new(recognizer: Arc<dyn PageRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Recognize all pages and return page-marked text.
    ///
    /// Each page runs on its own blocking task. A page that errors or panics
    /// contributes empty text. Blank pages are omitted from the output.
    pub async fn recognize(
        &self,
        images: Vec<DynamicImage>,
        on_progress: Option<&(dyn Fn(OcrProgress) + Send + Sync)>,
    ) -> String {
        if images.is_empty() {
            return String::new();
        }

        let total = images.len();
        debug!("Starting OCR fan-out over {} pages", total);

        let mut pending: FuturesUnordered<_> = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                let recognizer = Arc::clone(&self.recognizer);
                let handle = tokio::task::spawn_blocking(move || recognizer.recognize(&image));
                async move { (index, handle.await) }
            })
            .collect();

        if let Some(report) = on_progress {
            for page in 1..=total {
                report(OcrProgress {
                    page,
                    total,
                    progress: 0.0,
                    status: STATUS_RECOGNIZING,
                });
            }
        }

        let mut texts = vec![String::new(); total];
        while let Some((index, joined)) = pending.next().await {
            let page = index + 1;
            let (text, status) = match joined {
                Ok(Ok(text)) => (text, STATUS_DONE),
                Ok(Err(e)) => {
                    warn!("OCR failed on page {}: {}", page, e);
                    (String::new(), STATUS_FAILED)
                }
                Err(e) => {
                    warn!("OCR task for page {} did not complete: {}", page, e);
                    (String::new(), STATUS_FAILED)
                }
            };
            texts[index] = text;

            if let Some(report) = on_progress {
                report(OcrProgress {
                    page,
                    total,
                    progress: 1.0,
                    status,
                });
            }
        }

        join_pages(&texts)
    }
}

/// Concatenate page texts in order with `--- Page N ---` markers, skipping
/// whitespace-only pages.
pub fn join_pages(texts: &[String]) -> String {
    texts
        .iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(index, text)| format!("--- Page {} ---\n{}", index + 1, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Reads the page text out of the red channel of pixel (0, 0).
    struct PixelRecognizer;

    impl PageRecognizer for PixelRecognizer {
        fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
            let marker = image.to_rgba8().get_pixel(0, 0).0[0];
            match marker {
                0 => Ok("   ".to_string()),
                13 => Err(OcrError::Recognition("unreadable".to_string())),
                66 => panic!("recognizer crashed"),
                n => Ok(format!("text of {}", n)),
            }
        }
    }

    fn page(marker: u8) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([marker, 0, 0, 255])))
    }

    fn engine() -> OcrEngine {
        OcrEngine::new(Arc::new(PixelRecognizer))
    }

    #[tokio::test]
    async fn test_empty_input_is_empty_string() {
        assert_eq!(engine().recognize(Vec::new(), None).await, "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failing_second_page_keeps_first() {
        let text = engine().recognize(vec![page(1), page(13)], None).await;
        assert_eq!(text, "--- Page 1 ---\ntext of 1");
        assert!(!text.contains("Page 2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_page_contributes_nothing() {
        let text = engine()
            .recognize(vec![page(66), page(2), page(0), page(4)], None)
            .await;
        assert_eq!(
            text,
            "--- Page 2 ---\ntext of 2\n\n--- Page 4 ---\ntext of 4"
        );
    }

    #[tokio::test]
    async fn test_progress_is_reported_per_page() {
        let seen = Mutex::new(Vec::new());
        let report = |p: OcrProgress| seen.lock().unwrap().push(p);

        engine()
            .recognize(vec![page(1), page(13), page(3)], Some(&report))
            .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 6);
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(&p.progress)));

        let mut finished: Vec<_> = seen
            .iter()
            .filter(|p| p.progress == 1.0)
            .map(|p| (p.page, p.status))
            .collect();
        finished.sort();
        assert_eq!(
            finished,
            vec![(1, STATUS_DONE), (2, STATUS_FAILED), (3, STATUS_DONE)]
        );
    }

    #[test]
    fn test_reading_order() {
        let boxes = vec![
            TextBox {
                rect: (200.0, 5.0, 260.0, 18.0),
                text: "Total".to_string(),
                confidence: 0.9,
            },
            TextBox {
                rect: (10.0, 60.0, 90.0, 75.0),
                text: "Thanks".to_string(),
                confidence: 0.9,
            },
            TextBox {
                rect: (10.0, 2.0, 90.0, 16.0),
                text: "ACME".to_string(),
                confidence: 0.9,
            },
        ];
        assert_eq!(reading_order_text(boxes), "ACME\nTotal\nThanks");
    }
}
