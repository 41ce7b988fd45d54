//! Local Ollama daemon adapter.
//!
//! The local vision models cannot read PDFs, so PDFs are rasterized and the
//! first page is sent as the image while OCR text from every page goes into
//! the prompt.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures_util::StreamExt;
use image::DynamicImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::prompt::{SYSTEM_PROMPT, user_prompt};
use super::response::{NdjsonDecoder, parse_model_json};
use super::{Attempt, ExtractionProvider, SourceDocument};
use crate::error::{ProviderError, Result};
use crate::models::config::OllamaConfig;
use crate::models::event::{ExtractionObserver, LogLevel, StreamEvent, emit, emit_log};
use crate::ocr::{OcrEngine, OcrProgress};
use crate::pdf::{Rasterizer, encode_png};
use crate::schema::{self, Field};

const PROVIDER: &str = "ollama";

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub system: String,
    /// Base64-encoded images.
    pub images: Vec<String>,
    pub stream: bool,
    pub format: &'static str,
}

/// One NDJSON line, or the whole non-streamed body.
#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Sends a generate request to the daemon and returns the full model text.
#[async_trait]
pub trait DaemonTransport: Send + Sync {
    /// When `request.stream` is set, each fragment is forwarded to `observer`
    /// as a `response` event as it arrives.
    async fn generate(
        &self,
        request: &GenerateRequest,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<String>;
}

/// reqwest-backed transport for a daemon at `base_url`.
pub struct HttpDaemonTransport {
    client: Client,
    base_url: String,
}

impl HttpDaemonTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn request_error(source: reqwest::Error) -> ProviderError {
        ProviderError::Request {
            provider: PROVIDER,
            source,
        }
    }

    fn decode_line(line: &str) -> Result<GenerateChunk> {
        let chunk: GenerateChunk =
            serde_json::from_str(line).map_err(|e| ProviderError::Stream {
                provider: PROVIDER,
                message: format!("malformed line {:?}: {}", line, e),
            })?;
        if let Some(message) = chunk.error.clone() {
            return Err(ProviderError::Stream {
                provider: PROVIDER,
                message,
            }
            .into());
        }
        Ok(chunk)
    }
}

#[async_trait]
impl DaemonTransport for HttpDaemonTransport {
    async fn generate(
        &self,
        request: &GenerateRequest,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        debug!("POST {} (stream: {})", url, request.stream);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(Self::request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        if !request.stream {
            let body = response.text().await.map_err(Self::request_error)?;
            return Ok(Self::decode_line(&body)?.response);
        }

        let mut text = String::new();
        let mut decoder = NdjsonDecoder::new();
        let mut stream = response.bytes_stream();

        let accept = |line: &str, text: &mut String| -> Result<bool> {
            let chunk = Self::decode_line(line)?;
            if !chunk.response.is_empty() {
                emit(
                    observer,
                    StreamEvent::Response {
                        fragment: chunk.response.clone(),
                    },
                );
                text.push_str(&chunk.response);
            }
            Ok(chunk.done)
        };

        let mut done = false;
        'read: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(Self::request_error)?;
            for line in decoder.push(&bytes) {
                if accept(&line, &mut text)? {
                    done = true;
                    break 'read;
                }
            }
        }
        // Anything after the `done` line is ignored.
        if !done {
            if let Some(line) = decoder.finish() {
                accept(&line, &mut text)?;
            }
        }

        Ok(text)
    }
}

/// Local adapter: rasterize, OCR, prompt, call the daemon.
pub struct LocalDaemonProvider {
    config: OllamaConfig,
    rasterizer: Arc<dyn Rasterizer>,
    ocr: Option<OcrEngine>,
    transport: Arc<dyn DaemonTransport>,
}

impl LocalDaemonProvider {
    pub fn new(
        config: OllamaConfig,
        rasterizer: Arc<dyn Rasterizer>,
        ocr: Option<OcrEngine>,
        transport: Arc<dyn DaemonTransport>,
    ) -> Self {
        Self {
            config,
            rasterizer,
            ocr,
            transport,
        }
    }

    /// Page images for OCR and the base64 image to attach.
    async fn prepare_images(
        &self,
        source: &SourceDocument,
        observer: Option<&dyn ExtractionObserver>,
    ) -> (Vec<DynamicImage>, String) {
        if !source.kind.is_pdf() {
            let pages = match image::load_from_memory(&source.bytes) {
                Ok(image) => vec![image],
                Err(e) => {
                    emit_log(
                        observer,
                        LogLevel::Warn,
                        "Could not decode image for OCR",
                        json!({"error": e.to_string()}),
                    );
                    Vec::new()
                }
            };
            return (pages, source.base64.clone());
        }

        emit_log(
            observer,
            LogLevel::Info,
            "Rasterizing PDF",
            json!({"bytes": source.bytes.len()}),
        );

        let rasterizer = Arc::clone(&self.rasterizer);
        let bytes = source.bytes.clone();
        let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes))
            .await
            .ok()
            .flatten();

        let Some(pages) = pages else {
            emit_log(
                observer,
                LogLevel::Warn,
                "Rasterization failed, sending raw document bytes",
                Value::Null,
            );
            return (Vec::new(), source.base64.clone());
        };

        let first_page = pages.first().and_then(|page| match encode_png(page) {
            Ok(png) => Some(STANDARD.encode(png)),
            Err(e) => {
                debug!("First page PNG encoding failed: {}", e);
                None
            }
        });

        emit_log(
            observer,
            LogLevel::Info,
            "PDF rasterized",
            json!({"pages": pages.len()}),
        );

        let image = first_page.unwrap_or_else(|| source.base64.clone());
        (pages, image)
    }

    async fn recognize(
        &self,
        pages: Vec<DynamicImage>,
        observer: Option<&dyn ExtractionObserver>,
    ) -> String {
        let Some(engine) = &self.ocr else {
            debug!("No OCR engine configured");
            return String::new();
        };
        if pages.is_empty() {
            return String::new();
        }

        let report = |progress: OcrProgress| {
            emit_log(
                observer,
                LogLevel::Debug,
                format!("OCR page {}/{}: {}", progress.page, progress.total, progress.status),
                json!({
                    "page": progress.page,
                    "progress": progress.progress,
                    "status": progress.status,
                }),
            );
        };

        let text = engine.recognize(pages, Some(&report)).await;
        emit_log(
            observer,
            LogLevel::Info,
            "OCR complete",
            json!({"characters": text.len()}),
        );
        text
    }
}

#[async_trait]
impl ExtractionProvider for LocalDaemonProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn extract(
        &self,
        source: &SourceDocument,
        attempt: Attempt,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<Value> {
        let (pages, image) = self.prepare_images(source, observer).await;
        let ocr_text = self.recognize(pages, observer).await;

        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: user_prompt(&ocr_text),
            system: SYSTEM_PROMPT.to_string(),
            images: vec![image],
            stream: self.config.stream && attempt.stream,
            format: "json",
        };

        emit(
            observer,
            StreamEvent::Prompt {
                text: request.prompt.clone(),
            },
        );
        emit_log(
            observer,
            LogLevel::Info,
            "Sending request to Ollama",
            json!({
                "model": request.model,
                "attempt": attempt.number,
                "retry": attempt.is_retry(),
                "stream": request.stream,
            }),
        );

        let text = self.transport.generate(&request, observer).await?;
        debug!("Ollama returned {} characters", text.len());

        let mut value = parse_model_json(&text)?;
        if let Value::Object(object) = &mut value {
            if !ocr_text.is_empty() && !schema::has_field(object, Field::RawText) {
                object.insert("raw_text".to_string(), Value::String(ocr_text));
            }
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DocexError, OcrError};
    use crate::models::event::RecordingObserver;
    use crate::ocr::PageRecognizer;
    use crate::providers::test_server::{self, Reply, serve_once};
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;

    struct FixedRasterizer(Option<usize>);

    impl Rasterizer for FixedRasterizer {
        fn rasterize(&self, _data: &[u8]) -> Option<Vec<DynamicImage>> {
            self.0.map(|pages| {
                (0..pages)
                    .map(|i| DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([i as u8 + 1, 0, 0, 255]))))
                    .collect()
            })
        }
    }

    struct PageNumberRecognizer;

    impl PageRecognizer for PageNumberRecognizer {
        fn recognize(&self, image: &DynamicImage) -> std::result::Result<String, OcrError> {
            Ok(format!("page text {}", image.to_rgba8().get_pixel(0, 0).0[0]))
        }
    }

    #[derive(Default)]
    struct CapturingTransport {
        requests: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl DaemonTransport for CapturingTransport {
        async fn generate(
            &self,
            request: &GenerateRequest,
            observer: Option<&dyn ExtractionObserver>,
        ) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            if request.stream {
                emit(observer, StreamEvent::Response { fragment: "{\"type\":".to_string() });
                emit(observer, StreamEvent::Response { fragment: "\"receipt\"}".to_string() });
            }
            Ok("{\"type\":\"receipt\"}".to_string())
        }
    }

    fn provider(
        rasterizer: FixedRasterizer,
        transport: Arc<CapturingTransport>,
    ) -> LocalDaemonProvider {
        LocalDaemonProvider::new(
            OllamaConfig::default(),
            Arc::new(rasterizer),
            Some(OcrEngine::new(Arc::new(PageNumberRecognizer))),
            transport,
        )
    }

    #[tokio::test]
    async fn test_pdf_sends_first_page_and_all_ocr_text() {
        let transport = Arc::new(CapturingTransport::default());
        let provider = provider(FixedRasterizer(Some(3)), transport.clone());
        let source = SourceDocument::from_bytes(Path::new("statement.pdf"), b"%PDF-1.7".to_vec());
        let observer = RecordingObserver::new();

        let value = provider
            .extract(&source, Attempt::first(true), Some(&observer))
            .await
            .unwrap();
        assert_eq!(value["type"], "receipt");
        assert!(value["raw_text"].as_str().unwrap().starts_with("--- Page 1 ---"));

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.images.len(), 1);
        assert_ne!(request.images[0], source.base64);
        let first_page = image::load_from_memory(&STANDARD.decode(&request.images[0]).unwrap()).unwrap();
        assert_eq!(first_page.to_rgba8().get_pixel(0, 0).0[0], 1);
        for page in 1..=3 {
            assert!(request.prompt.contains(&format!("--- Page {} ---\npage text {}", page, page)));
        }
        assert!(request.stream);
        assert_eq!(request.format, "json");
        assert_eq!(observer.last_prompt(), Some(request.prompt));
        assert_eq!(observer.response_text(), "{\"type\":\"receipt\"}");
    }

    #[tokio::test]
    async fn test_failed_rasterization_falls_back_to_raw_bytes() {
        let transport = Arc::new(CapturingTransport::default());
        let provider = provider(FixedRasterizer(None), transport.clone());
        let source = SourceDocument::from_bytes(Path::new("scan.pdf"), b"garbage".to_vec());

        provider.extract(&source, Attempt::first(false), None).await.unwrap();

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.images, vec![source.base64.clone()]);
        assert!(request.prompt.contains("from the attached image directly"));
        assert!(!request.stream);
    }

    #[tokio::test]
    async fn test_image_input_is_sent_as_is_and_ocred() {
        let transport = Arc::new(CapturingTransport::default());
        let provider = provider(FixedRasterizer(Some(5)), transport.clone());

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([7, 0, 0, 255])))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let source = SourceDocument::from_bytes(Path::new("receipt.png"), png);

        provider.extract(&source, Attempt::first(true).retry(), None).await.unwrap();

        let request = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(request.images, vec![source.base64.clone()]);
        assert!(request.prompt.contains("--- Page 1 ---\npage text 7"));
        assert!(!request.prompt.contains("Page 2"));
        assert!(!request.stream);
    }

    #[tokio::test]
    async fn test_unparseable_output_is_parse_error() {
        struct Chatty;

        #[async_trait]
        impl DaemonTransport for Chatty {
            async fn generate(
                &self,
                _request: &GenerateRequest,
                _observer: Option<&dyn ExtractionObserver>,
            ) -> Result<String> {
                Ok("I cannot help with that.".to_string())
            }
        }

        let provider = LocalDaemonProvider::new(
            OllamaConfig::default(),
            Arc::new(FixedRasterizer(None)),
            None,
            Arc::new(Chatty),
        );
        let source = SourceDocument::from_bytes(Path::new("x.jpg"), vec![0xff, 0xd8]);
        let err = provider
            .extract(&source, Attempt::first(false), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocexError::Provider(ProviderError::Parse { .. })
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_stream_line_with_error_field() {
        assert!(HttpDaemonTransport::decode_line("{\"error\":\"model not found\"}").is_err());
        let chunk = HttpDaemonTransport::decode_line("{\"response\":\"ab\",\"done\":true}").unwrap();
        assert_eq!(chunk.response, "ab");
        assert!(chunk.done);
    }

    fn generate_request(stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: "m".to_string(),
            prompt: String::new(),
            system: String::new(),
            images: Vec::new(),
            stream,
            format: "json",
        }
    }

    #[tokio::test]
    async fn test_http_stream_reassembles_lines_split_across_chunks() {
        let (base_url, server) = serve_once(Reply::ok(&[
            "{\"response\":\"{\\\"type\\\":\",\"done\":false}\n{\"response\":\"\\\"rec",
            "eipt\\\"}\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true}\n",
        ]))
        .await;
        let transport = HttpDaemonTransport::new(test_server::client(), format!("{}/", base_url));
        let observer = RecordingObserver::new();

        let text = transport
            .generate(&generate_request(true), Some(&observer))
            .await
            .unwrap();
        assert_eq!(text, "{\"type\":\"receipt\"}");
        assert_eq!(observer.response_text(), text);
        let fragments: Vec<_> = observer
            .events()
            .into_iter()
            .filter(|e| matches!(e, StreamEvent::Response { .. }))
            .collect();
        assert_eq!(fragments.len(), 2);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/generate "), "{}", request);
        assert!(request.contains("\"stream\":true"));
        assert!(request.contains("\"format\":\"json\""));
    }

    #[tokio::test]
    async fn test_http_stream_returns_at_done_without_waiting_for_eof() {
        let (base_url, server) = serve_once(Reply {
            hold_open: true,
            ..Reply::ok(&["{\"response\":\"{}\",\"done\":true}\n"])
        })
        .await;
        let transport = HttpDaemonTransport::new(test_server::client(), base_url);

        let text = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            transport.generate(&generate_request(true), None),
        )
        .await
        .expect("generate should return once done is seen")
        .unwrap();
        assert_eq!(text, "{}");
        server.abort();
    }

    #[tokio::test]
    async fn test_http_non_streamed_body() {
        let (base_url, server) = serve_once(Reply::ok(&[
            "{\"response\":\"{\\\"type\\\":\\\"invoice\\\"}\",\"done\":true}",
        ]))
        .await;
        let transport = HttpDaemonTransport::new(test_server::client(), base_url);
        let observer = RecordingObserver::new();

        let text = transport
            .generate(&generate_request(false), Some(&observer))
            .await
            .unwrap();
        assert_eq!(text, "{\"type\":\"invoice\"}");
        assert!(observer.events().is_empty());
        assert!(server.await.unwrap().contains("\"stream\":false"));
    }

    #[tokio::test]
    async fn test_http_error_status_carries_body() {
        let (base_url, _server) =
            serve_once(Reply::status("400 Bad Request", "{\"error\":\"invalid model\"}")).await;
        let transport = HttpDaemonTransport::new(test_server::client(), base_url);

        let err = transport
            .generate(&generate_request(true), None)
            .await
            .unwrap_err();
        match err {
            DocexError::Provider(ProviderError::Status { provider, status, body }) => {
                assert_eq!(provider, "ollama");
                assert_eq!(status, 400);
                assert!(body.contains("invalid model"), "{}", body);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_stream_error_line() {
        let (base_url, _server) = serve_once(Reply::ok(&[
            "{\"response\":\"{\",\"done\":false}\n{\"error\":\"out of memory\"}\n",
        ]))
        .await;
        let transport = HttpDaemonTransport::new(test_server::client(), base_url);

        let err = transport
            .generate(&generate_request(true), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DocexError::Provider(ProviderError::Stream { .. })
        ));
        assert!(err.to_string().contains("out of memory"));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_request_error() {
        let transport = HttpDaemonTransport::new(Client::new(), "http://127.0.0.1:9");
        let err = transport.generate(&generate_request(false), None).await.unwrap_err();
        assert!(matches!(
            err,
            DocexError::Provider(ProviderError::Request { .. })
        ));
    }
}
