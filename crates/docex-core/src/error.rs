//! Error types for the docex-core library.

use thiserror::Error;

/// Main error type for the docex library.
#[derive(Error, Debug)]
pub enum DocexError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Model provider error (transport, status, unparseable output).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Model output could not be normalized into a document.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error, e.g. a missing credential.
    #[error("configuration error: {0}")]
    Config(String),

    /// The configured provider exists by name but has no implementation.
    #[error("AI provider '{0}' is not yet implemented")]
    UnsupportedProvider(String),

    /// Document store error.
    #[error("store error: {0}")]
    Store(String),
}

impl DocexError {
    /// Whether the orchestrator may retry the provider call after this error.
    ///
    /// Only validation failures qualify: a non-2xx response, a missing
    /// credential or unparseable output would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocexError::Validation(_))
    }
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to render a page.
    #[error("failed to render page {page}: {reason}")]
    Render { page: u32, reason: String },

    /// Failed to extract images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// The recognition task panicked or was cancelled.
    #[error("recognition task failed: {0}")]
    Task(String),
}

/// Errors raised by model provider adapters.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP request could not be sent or the body could not be read.
    #[error("request to {provider} failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The model output is not recoverable JSON.
    #[error("could not parse model output as JSON: {reason}\nraw output: {raw}")]
    Parse { reason: String, raw: String },

    /// The provider envelope was well-formed but carried no model text.
    #[error("{provider} returned no content")]
    EmptyResponse { provider: &'static str },

    /// A streamed line reported an error.
    #[error("{provider} stream error: {message}")]
    Stream {
        provider: &'static str,
        message: String,
    },
}

/// A payload shape the normalizer cannot repair.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The top-level payload is not a JSON object.
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field holds a JSON kind that cannot be coerced.
    #[error("field '{field}' has unsupported type {found}")]
    FieldType { field: String, found: &'static str },

    /// A line item is not a JSON object.
    #[error("line item {index} is not an object")]
    LineItem { index: usize },
}

/// Result type for the docex library.
pub type Result<T> = std::result::Result<T, DocexError>;
