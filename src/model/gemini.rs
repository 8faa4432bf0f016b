//! Google Gemini backend with native structured output.
//!
//! Calls `models/{model}:generateContent` with the bill as an `inlineData`
//! part and `responseSchema` set, so Gemini itself constrains the reply to
//! the extraction schema. We still deserialise the reply strictly; a model
//! that ignores the schema surfaces as [`ProviderError::Schema`].

use super::{parse_record, BillModel, ProviderError};
use crate::pipeline::load::ImagePayload;
use crate::prompts::response_schema;
use crate::record::BillExtraction;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Default model, fast and cheap enough for one-page bills.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Public Generative Language API endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables the CLI checks for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_output_tokens: Option<usize>,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            temperature: 0.0,
            max_output_tokens: None,
        }
    }

    /// Use a preconfigured HTTP client (proxies, custom TLS roots).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_max_output_tokens(mut self, n: usize) -> Self {
        self.max_output_tokens = Some(n);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Request body for one extraction call.
    fn request_body(&self, instruction: &str, image: &ImagePayload) -> Value {
        let mut generation_config = json!({
            "temperature": self.temperature,
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        });
        if let Some(n) = self.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(n);
        }

        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": instruction },
                    { "inlineData": { "mimeType": image.mime_type, "data": image.to_base64() } }
                ]
            }],
            "generationConfig": generation_config,
        })
    }
}

impl std::fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiModel")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success HTTP response to a [`ProviderError`].
fn classify_status(status: u16, body: &str, retry_after_secs: Option<u64>) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        429 => ProviderError::RateLimited {
            provider: "gemini".to_string(),
            retry_after_secs,
        },
        401 | 403 => ProviderError::Auth {
            provider: "gemini".to_string(),
            detail: message,
        },
        _ => ProviderError::Api { status, message },
    }
}

/// Pull the JSON text out of a successful response.
fn response_text(body: &str) -> Result<String, ProviderError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::Schema(format!("unexpected Gemini response: {e}")))?;

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Api {
            status: 200,
            message: format!("request blocked: {reason}"),
        });
    }

    if let Some(usage) = parsed.usage_metadata {
        debug!(
            "Gemini usage: {} input tokens, {} output tokens",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Schema("Gemini returned no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(ProviderError::Schema(format!(
            "Gemini returned an empty reply (finish reason: {reason})"
        )));
    }

    Ok(text)
}

#[async_trait]
impl BillModel for GeminiModel {
    fn name(&self) -> String {
        format!("gemini/{}", self.model)
    }

    async fn invoke(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> Result<BillExtraction, ProviderError> {
        let body = self.request_body(instruction, image);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), &text, retry_after_secs));
        }

        parse_record(&response_text(&text)?)
    }
}
