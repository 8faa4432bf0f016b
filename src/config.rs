//! Configuration for a bill extraction run.
//!
//! Everything the pipeline needs is held in [`ExtractionConfig`], built once
//! at process start and passed down explicitly. The library never reads
//! `.env` files or environment variables itself: the CLI resolves
//! `GOOGLE_API_KEY`, `GEMINI_BASE_URL` and `BILL_EXTRACT_PROVIDER` and sets
//! them here. Non-Gemini providers are built by `edgequake_llm`'s factory,
//! which looks up its own keys (`OPENAI_API_KEY`, …).

use crate::error::BillError;
use crate::model::gemini::{GeminiModel, DEFAULT_GEMINI_MODEL};
use crate::model::{BillModel, LlmProviderModel, ProviderError};
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Provider name that selects the native Gemini backend.
pub const GEMINI_PROVIDER: &str = "gemini";

/// Configuration for bill extraction.
///
/// # Example
/// ```rust
/// use bill_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gemini-2.5-pro")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.model.as_deref(), Some("gemini-2.5-pro"));
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier. If None, `gemini-2.5-flash`.
    pub model: Option<String>,

    /// Provider name: `gemini` for the native backend, anything else is
    /// handed to `edgequake_llm` (e.g. "openai", "anthropic", "ollama").
    /// If None, `gemini`.
    pub provider_name: Option<String>,

    /// Pre-constructed model. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn BillModel>>,

    /// API key for the native Gemini backend. Required when it is selected.
    pub api_key: Option<String>,

    /// Gemini endpoint override (proxies, tests). If None, the public API.
    pub base_url: Option<String>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction is transcription, not generation; zero keeps repeated runs
    /// on the same bill stable.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 2048.
    ///
    /// A full record with long addresses is a few hundred tokens.
    pub max_tokens: usize,

    /// Retries on transient failures (429, 5xx, transport). Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: None (provider default).
    pub api_timeout_secs: Option<u64>,

    /// Replacement for the built-in instruction.
    pub instruction: Option<String>,

    /// Asserted MIME type of the input image; skips detection.
    pub mime_override: Option<String>,

    /// Receives stage events (used by the CLI spinner).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            api_key: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: 2048,
            max_retries: 0,
            retry_backoff_ms: 500,
            api_timeout_secs: None,
            instruction: None,
            mime_override: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("instruction", &self.instruction.as_ref().map(|s| s.len()))
            .field("mime_override", &self.mime_override)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Model identifier in effect.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL)
    }

    /// Resolve the model to call, from most- to least-specific:
    ///
    /// 1. `provider` — used as-is.
    /// 2. `provider_name` — `gemini` builds the native client from
    ///    `api_key` and `base_url`, any other name goes through
    ///    `edgequake_llm::ProviderFactory`.
    /// 3. Native Gemini.
    ///
    /// # Errors
    /// [`ProviderError::NotConfigured`] when Gemini is selected without an
    /// API key, or the factory rejects the provider name.
    pub fn resolve_model(&self) -> Result<Arc<dyn BillModel>, ProviderError> {
        if let Some(ref provider) = self.provider {
            return Ok(Arc::clone(provider));
        }

        let name = self.provider_name.as_deref().unwrap_or(GEMINI_PROVIDER);
        let model = self.model_or_default();
        debug!("Resolving provider {}/{}", name, model);

        if name.eq_ignore_ascii_case(GEMINI_PROVIDER) {
            let key = self
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| ProviderError::NotConfigured {
                    provider: GEMINI_PROVIDER.to_string(),
                    hint: "set an API key (GOOGLE_API_KEY or GEMINI_API_KEY for the CLI)"
                        .to_string(),
                })?;
            let mut gemini = GeminiModel::new(key, model)
                .with_temperature(self.temperature)
                .with_max_output_tokens(self.max_tokens);
            if let Some(ref url) = self.base_url {
                gemini = gemini.with_base_url(url.clone());
            }
            return Ok(Arc::new(gemini));
        }

        Ok(Arc::new(
            LlmProviderModel::create(name, model)?
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens),
        ))
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn BillModel>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn mime_override(mut self, mime: impl Into<String>) -> Self {
        self.config.mime_override = Some(mime.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, BillError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(BillError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(BillError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(ref m) = c.mime_override {
            if !m.starts_with("image/") {
                return Err(BillError::InvalidConfig(format!(
                    "MIME type must be an image type, got '{m}'"
                )));
            }
        }
        if matches!(c.instruction.as_deref(), Some(s) if s.trim().is_empty()) {
            return Err(BillError::InvalidConfig("instruction must not be empty".into()));
        }
        Ok(self.config)
    }
}
