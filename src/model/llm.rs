//! Adapter from any `edgequake_llm` chat provider to [`BillModel`].
//!
//! Chat providers (OpenAI, Anthropic, Ollama, …) are not asked for
//! provider-side schema enforcement here; the schema goes into the system
//! message and the reply is validated locally by deserialising it.

use super::{parse_record, BillModel, ProviderError};
use crate::pipeline::load::ImagePayload;
use crate::prompts::json_mode_instruction;
use crate::record::BillExtraction;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use std::sync::Arc;
use tracing::debug;

/// A [`BillModel`] backed by an `edgequake_llm` provider.
pub struct LlmProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            temperature: 0.0,
            max_tokens: 2048,
        }
    }

    /// Instantiate a named provider; the factory reads the matching API key
    /// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …) from the environment.
    pub fn create(provider_name: &str, model: &str) -> Result<Self, ProviderError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            ProviderError::NotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn with_max_tokens(mut self, n: usize) -> Self {
        self.max_tokens = n;
        self
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for LlmProviderModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmProviderModel")
            .field("label", &self.label)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait]
impl BillModel for LlmProviderModel {
    fn name(&self) -> String {
        self.label.clone()
    }

    async fn invoke(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> Result<BillExtraction, ProviderError> {
        // The image carries all the content; the user turn text stays empty.
        let messages = vec![
            ChatMessage::system(json_mode_instruction(instruction)),
            ChatMessage::user_with_images(
                "",
                vec![ImageData::new(image.to_base64(), image.mime_type.clone()).with_detail("high")],
            ),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify_llm_error(&self.label, e))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        parse_record(&response.content)
    }
}

/// Map an `edgequake_llm` error onto the retry-relevant [`ProviderError`] kinds.
///
/// Providers that only report a status inside `ApiError` text get a
/// narrow second look for 429 and 401/403.
fn classify_llm_error(provider: &str, err: LlmError) -> ProviderError {
    match err {
        LlmError::RateLimited(_) => ProviderError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs: None,
        },
        LlmError::AuthError(detail) => ProviderError::Auth {
            provider: provider.to_string(),
            detail,
        },
        LlmError::NetworkError(message) => ProviderError::Transport(message),
        LlmError::Timeout => ProviderError::Transport("request timed out".to_string()),
        LlmError::ConfigError(hint) | LlmError::ModelNotFound(hint) => {
            ProviderError::NotConfigured {
                provider: provider.to_string(),
                hint,
            }
        }
        other => {
            let message = other.to_string();
            let lower = message.to_lowercase();
            if lower.contains("429") || lower.contains("rate limit") {
                ProviderError::RateLimited {
                    provider: provider.to_string(),
                    retry_after_secs: None,
                }
            } else if lower.contains("401") || lower.contains("403") {
                ProviderError::Auth {
                    provider: provider.to_string(),
                    detail: message,
                }
            } else {
                ProviderError::Api { status: 0, message }
            }
        }
    }
}
