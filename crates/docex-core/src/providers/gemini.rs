//! Google Gemini generate-content adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::prompt::CLOUD_INSTRUCTION;
use super::response::{parse_model_json, strip_code_fences};
use super::{Attempt, ExtractionProvider, SourceDocument};
use crate::error::{DocexError, ProviderError, Result};
use crate::models::config::GeminiConfig;
use crate::models::event::{ExtractionObserver, LogLevel, StreamEvent, emit, emit_log};

const PROVIDER: &str = "gemini";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

/// Cloud adapter: sends the whole document inline and lets the model read it.
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(client: Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                DocexError::Config(
                    "Gemini API key is not set (gemini.api_key or GEMINI_API_KEY)".to_string(),
                )
            })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl ExtractionProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn extract(
        &self,
        source: &SourceDocument,
        _attempt: Attempt,
        observer: Option<&dyn ExtractionObserver>,
    ) -> Result<Value> {
        let api_key = self.api_key()?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(CLOUD_INSTRUCTION.to_string()),
                        ..Default::default()
                    },
                    Part {
                        inline_data: Some(InlineData {
                            mime_type: source.kind.mime_type().to_string(),
                            data: source.base64.clone(),
                        }),
                        ..Default::default()
                    },
                ],
            }],
        };

        emit(
            observer,
            StreamEvent::Prompt {
                text: CLOUD_INSTRUCTION.to_string(),
            },
        );
        emit_log(
            observer,
            LogLevel::Info,
            "Sending document to Gemini",
            json!({
                "model": self.config.model,
                "mimeType": source.kind.mime_type(),
                "bytes": source.bytes.len(),
            }),
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|source| ProviderError::Request {
                provider: PROVIDER,
                source,
            })?;

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

        let envelope: GenerateContentResponse =
            response.json().await.map_err(|source| ProviderError::Request {
                provider: PROVIDER,
                source,
            })?;

        let text = envelope
            .text()
            .ok_or(ProviderError::EmptyResponse { provider: PROVIDER })?;
        debug!("Gemini returned {} characters", text.len());

        emit(
            observer,
            StreamEvent::Response {
                fragment: text.clone(),
            },
        );

        Ok(parse_model_json(strip_code_fences(&text))?)
    }
}
