//! Model backends that turn a document into a raw JSON payload.

pub mod gemini;
pub mod ollama;
pub mod prompt;
pub mod response;

#[cfg(test)]
mod test_server;

pub use gemini::GeminiProvider;
pub use ollama::{DaemonTransport, GenerateRequest, HttpDaemonTransport, LocalDaemonProvider};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::error::Result;
use crate::mime::{self, MimeKind};
use crate::models::event::ExtractionObserver;

/// A source file read into memory, with its inline (base64) encoding.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Basename of `path`.
    pub filename: String,
    pub kind: MimeKind,
    pub bytes: Vec<u8>,
    pub base64: String,
}

impl SourceDocument {
    /// Read and classify a file.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(path, bytes))
    }

    pub fn from_bytes(path: &Path, bytes: Vec<u8>) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            path: path.to_path_buf(),
            filename,
            kind: mime::classify(path),
            base64: STANDARD.encode(&bytes),
            bytes,
        }
    }
}

/// One provider call within an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1 for the first call, 2 for the retry.
    pub number: u32,
    /// Whether the transport may stream response fragments.
    pub stream: bool,
}

impl Attempt {
    pub fn first(stream: bool) -> Self {
        Self { number: 1, stream }
    }

    /// The single retry: never streamed.
    pub fn retry(self) -> Self {
        Self {
            number: self.number + 1,
            stream: false,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.number > 1
    }
}

/// A model backend.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Run one call and return the model's JSON payload, unvalidated.
    async fn extract(
        &self,
        source: &SourceDocument,
        attempt: Attempt,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_document_from_bytes() {
        let source = SourceDocument::from_bytes(Path::new("/tmp/in/Receipt.JPG"), vec![1, 2, 3]);
        assert_eq!(source.filename, "Receipt.JPG");
        assert_eq!(source.kind, MimeKind::Jpeg);
        assert_eq!(source.base64, "AQID");
    }

    #[test]
    fn test_retry_disables_streaming() {
        let first = Attempt::first(true);
        assert!(!first.is_retry());
        let retry = first.retry();
        assert_eq!(retry, Attempt { number: 2, stream: false });
        assert!(retry.is_retry());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let err = SourceDocument::read(Path::new("/nonexistent/x.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::DocexError::Io(_)));
    }
}
