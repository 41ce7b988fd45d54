//! Extraction orchestrator.
//!
//! Routes a document to the configured provider, validates the payload,
//! retries the local path once when validation fails and stamps the result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};

use crate::error::{DocexError, Result};
use crate::models::config::{AiProvider, DocexConfig};
use crate::models::document::{ExtractedDocument, ValidatedFields};
use crate::models::event::{ExtractionObserver, LogLevel, emit_log};
use crate::ocr::{OcrEngine, PageRecognizer};
use crate::pdf::{PdfRasterizer, Rasterizer};
use crate::providers::{
    Attempt, DaemonTransport, ExtractionProvider, GeminiProvider, HttpDaemonTransport,
    LocalDaemonProvider, SourceDocument,
};
use crate::schema;

/// Per-call options.
#[derive(Clone, Copy, Default)]
pub struct ExtractOptions<'a> {
    /// Receives log, prompt and response events for this extraction.
    pub observer: Option<&'a dyn ExtractionObserver>,
}

impl<'a> ExtractOptions<'a> {
    pub fn with_observer(observer: &'a dyn ExtractionObserver) -> Self {
        Self {
            observer: Some(observer),
        }
    }
}

/// Builder for [`Extractor`].
pub struct ExtractorBuilder {
    config: DocexConfig,
    rasterizer: Option<Arc<dyn Rasterizer>>,
    recognizer: Option<Arc<dyn PageRecognizer>>,
    transport: Option<Arc<dyn DaemonTransport>>,
    client: Option<Client>,
}

impl ExtractorBuilder {
    pub fn new(config: DocexConfig) -> Self {
        Self {
            config,
            rasterizer: None,
            recognizer: None,
            transport: None,
            client: None,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn PageRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn DaemonTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<Extractor> {
        let config = self.config;

        let client = match self.client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder();
                if let Some(secs) = config.http.request_timeout_secs {
                    builder = builder.timeout(Duration::from_secs(secs));
                }
                builder
                    .build()
                    .map_err(|e| DocexError::Config(format!("HTTP client: {}", e)))?
            }
        };

        let rasterizer = self
            .rasterizer
            .unwrap_or_else(|| Arc::new(PdfRasterizer::from_config(&config.pdf)));

        let recognizer = match self.recognizer {
            Some(recognizer) if config.ocr.enabled => Some(recognizer),
            Some(_) => None,
            None => default_recognizer(&config),
        };

        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(HttpDaemonTransport::new(
                client.clone(),
                config.ollama.base_url.clone(),
            ))
        });

        let gemini = GeminiProvider::new(client, config.gemini.clone());
        let local = LocalDaemonProvider::new(
            config.ollama.clone(),
            rasterizer,
            recognizer.map(OcrEngine::new),
            transport,
        );

        Ok(Extractor {
            config,
            gemini,
            local,
        })
    }
}

/// Load the OCR models named in the config. Missing or broken models leave
/// the extractor without OCR.
#[cfg(feature = "native-ocr")]
fn default_recognizer(config: &DocexConfig) -> Option<Arc<dyn PageRecognizer>> {
    if !config.ocr.enabled {
        return None;
    }
    if !config.ocr.models_present() {
        info!(
            "OCR models not found in {}, continuing without OCR",
            config.ocr.model_dir.display()
        );
        return None;
    }
    match crate::ocr::PureOcrEngine::from_config(&config.ocr) {
        Ok(engine) => Some(Arc::new(engine)),
        Err(e) => {
            tracing::warn!("OCR disabled: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "native-ocr"))]
fn default_recognizer(_config: &DocexConfig) -> Option<Arc<dyn PageRecognizer>> {
    None
}

/// Owns configuration and collaborators for extracting documents.
pub struct Extractor {
    config: DocexConfig,
    gemini: GeminiProvider,
    local: LocalDaemonProvider,
}

impl Extractor {
    pub fn builder(config: DocexConfig) -> ExtractorBuilder {
        ExtractorBuilder::new(config)
    }

    /// Extractor with default collaborators.
    pub fn from_config(config: DocexConfig) -> Result<Self> {
        ExtractorBuilder::new(config).build()
    }

    pub fn config(&self) -> &DocexConfig {
        &self.config
    }

    /// Extract a structured record from a PDF or image file.
    pub async fn extract_document(
        &self,
        path: &Path,
        options: ExtractOptions<'_>,
    ) -> Result<ExtractedDocument> {
        let observer = options.observer;
        let provider = self.config.ai_provider;

        emit_log(
            observer,
            LogLevel::Info,
            format!("Starting extraction with {}", provider),
            json!({"provider": provider.as_str(), "path": path.display().to_string()}),
        );

        let source = SourceDocument::read(path).await?;
        emit_log(
            observer,
            LogLevel::Debug,
            "Read source document",
            json!({
                "filename": source.filename,
                "bytes": source.bytes.len(),
                "mimeType": source.kind.mime_type(),
            }),
        );

        let fields = match provider {
            AiProvider::Gemini => {
                debug!("Calling {}", self.gemini.name());
                let raw = self
                    .gemini
                    .extract(&source, Attempt::first(false), observer)
                    .await?;
                schema::validate(&raw)?
            }
            AiProvider::Ollama => self.extract_local(&source, observer).await?,
            AiProvider::OpenAi => {
                return Err(DocexError::UnsupportedProvider(provider.to_string()));
            }
        };

        let document = ExtractedDocument::new(source.filename, fields);
        info!("Extracted {}: {}", document.filename, document.summary());
        emit_log(
            observer,
            LogLevel::Info,
            "Extraction complete",
            json!({"id": document.id.to_string(), "type": document.doc_type().as_str()}),
        );

        Ok(document)
    }

    /// Local path with the single retry. The retry is never streamed and
    /// does not report to the observer.
    async fn extract_local(
        &self,
        source: &SourceDocument,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<ValidatedFields> {
        let attempt = Attempt::first(self.config.ollama.stream);

        match self.run_local(source, attempt, observer).await {
            Err(e) if e.is_retryable() => {
                let retry = attempt.retry();
                emit_log(
                    observer,
                    LogLevel::Warn,
                    "Model output failed validation, retrying once",
                    json!({"error": e.to_string(), "attempt": retry.number}),
                );
                self.run_local(source, retry, None).await
            }
            result => result,
        }
    }

    async fn run_local(
        &self,
        source: &SourceDocument,
        attempt: Attempt,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<ValidatedFields> {
        debug!("Calling {} (attempt {})", self.local.name(), attempt.number);
        let raw = self.local.extract(source, attempt, observer).await?;
        Ok(schema::validate(&raw)?)
    }
}
