//! Core library for AI-assisted financial document extraction.
//!
//! This crate provides:
//! - PDF rasterization (pdfium rendering with an embedded-image fallback)
//! - Concurrent page OCR
//! - Cloud (Gemini) and local (Ollama) model providers
//! - Lenient normalization of model output into a canonical record
//! - An orchestrator with a single validation retry
//! - A JSON directory document store

pub mod error;
pub mod extractor;
pub mod mime;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod providers;
pub mod schema;
pub mod store;

pub use error::{DocexError, Result};
pub use extractor::{ExtractOptions, Extractor, ExtractorBuilder};
pub use mime::MimeKind;
pub use models::config::{AiProvider, DocexConfig};
pub use models::document::{DocumentType, ExtractedDocument, LineItem, ValidatedFields};
pub use models::event::{ExtractionObserver, LogLevel, RecordingObserver, StreamEvent};
pub use ocr::{OcrEngine, OcrProgress, PageRecognizer};
#[cfg(feature = "native-ocr")]
pub use ocr::PureOcrEngine;
pub use pdf::{PdfRasterizer, Rasterizer};
pub use store::{DocumentStatus, DocumentStore, JsonDirStore, StoredDocument};
