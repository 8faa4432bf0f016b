//! Extractor: ask the model for the extraction record.
//!
//! Thin on purpose. The instruction lives in [`crate::prompts`], the wire
//! format in [`crate::model`]; this module owns only the call policy:
//! optional timeout, optional retries, and logging of field warnings.
//!
//! ## Retry Strategy
//!
//! Off by default (`max_retries = 0`). When enabled, only transient errors
//! (HTTP 429, 5xx, transport failures, timeouts) are retried, waiting
//! `retry_backoff_ms * 2^(attempt-1)` or the server's `Retry-After`,
//! whichever is longer, capped at [`MAX_BACKOFF_MS`]. Schema and auth errors
//! fail immediately.

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::model::{BillModel, ProviderError};
use crate::pipeline::load::ImagePayload;
use crate::prompts::EXTRACTION_INSTRUCTION;
use crate::record::BillExtraction;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

static RE_JSON_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json|JSON)?\s*\n(.*?)\n?```\s*$").unwrap());

/// Upper bound on a single retry wait, whatever the server asks for.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt` (1-based).
///
/// `base_ms * 2^(attempt-1)`, raised to `Retry-After` when the server sent a
/// longer one, never above [`MAX_BACKOFF_MS`].
pub fn retry_delay_ms(base_ms: u64, attempt: u32, retry_after_secs: Option<u64>) -> u64 {
    let backoff = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .map_or(u64::MAX, |factor| base_ms.saturating_mul(factor));
    let requested = retry_after_secs.map_or(0, |s| s.saturating_mul(1000));
    backoff.max(requested).min(MAX_BACKOFF_MS)
}

/// Remove a Markdown code fence wrapped around a JSON reply.
pub fn strip_json_fences(text: &str) -> &str {
    match RE_JSON_FENCES.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => text.trim(),
    }
}

/// Sends one image to a [`BillModel`] under the configured call policy.
#[derive(Clone)]
pub struct Extractor {
    model: Arc<dyn BillModel>,
    instruction: String,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: Option<u64>,
}

impl Extractor {
    /// Build an extractor around an already-resolved model.
    pub fn new(model: Arc<dyn BillModel>, config: &ExtractionConfig) -> Self {
        Self {
            model,
            instruction: config
                .instruction
                .clone()
                .unwrap_or_else(|| EXTRACTION_INSTRUCTION.to_string()),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout_secs: config.api_timeout_secs,
        }
    }

    pub fn model_name(&self) -> String {
        self.model.name()
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Run the extraction for `image`.
    pub async fn extract(&self, image: &ImagePayload) -> Result<BillExtraction, ExtractionError> {
        let start = Instant::now();
        let model_name = self.model.name();
        info!("Extracting with {} ({} byte image)", model_name, image.len());

        let mut attempt: u32 = 0;
        let record = loop {
            match self.call_once(image).await {
                Ok(record) => break record,
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let wait_ms = retry_delay_ms(self.retry_backoff_ms, attempt, e.retry_after_secs());
                    warn!(
                        "{}: retry {}/{} after {}ms: {}",
                        model_name, attempt, self.max_retries, wait_ms, e
                    );
                    sleep(Duration::from_millis(wait_ms)).await;
                }
                Err(e) if e.is_transient() && self.max_retries > 0 => {
                    return Err(ExtractionError::RetriesExhausted {
                        retries: self.max_retries,
                        last: e,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        };

        debug!(
            "{}: extracted {} fields in {:?} ({} retries)",
            model_name,
            record.populated_fields(),
            start.elapsed(),
            attempt
        );

        for w in record.validate() {
            warn!("{} = {:?}: {}", w.field, w.value, w.reason);
        }

        Ok(record)
    }

    async fn call_once(&self, image: &ImagePayload) -> Result<BillExtraction, ProviderError> {
        let call = self.model.invoke(&self.instruction, image);
        match self.api_timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), call)
                .await
                .unwrap_or(Err(ProviderError::Timeout { secs })),
            None => call.await,
        }
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("model", &self.model.name())
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}
