//! The hosted vision model, seen as a single capability.
//!
//! The extractor only needs one thing from a model: turn an instruction and
//! an image into a [`BillExtraction`]. Putting that behind [`BillModel`]
//! keeps the workflow independent of any network service, so tests can swap
//! in a stub that returns canned records.
//!
//! Two implementations ship with the crate:
//!
//! * [`gemini::GeminiModel`] — Google Gemini with native structured output
//!   (the default).
//! * [`llm::LlmProviderModel`] — any `edgequake_llm` chat provider, with the
//!   schema embedded in the prompt and the reply parsed locally.

pub mod gemini;
pub mod llm;

use crate::pipeline::load::ImagePayload;
use crate::record::BillExtraction;
use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiModel;
pub use llm::LlmProviderModel;

/// A vision-capable model that returns schema-conforming extraction records.
#[async_trait]
pub trait BillModel: Send + Sync {
    /// Short identifier for logs, e.g. `gemini/gemini-2.5-flash`.
    fn name(&self) -> String;

    /// Send one request containing `instruction` and `image`.
    async fn invoke(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> Result<BillExtraction, ProviderError>;
}

/// Errors reported by a [`BillModel`].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Missing API key or unknown provider name.
    #[error("provider '{provider}' is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },

    /// Connection failed before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete in time.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 429.
    #[error("rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// HTTP 401/403.
    #[error("authentication error from provider '{provider}': {detail}")]
    Auth { provider: String, detail: String },

    /// Any other non-success response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The response did not match the extraction schema.
    #[error("response does not match the extraction schema: {0}")]
    Schema(String),
}

impl ProviderError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_)
            | ProviderError::Timeout { .. }
            | ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::NotConfigured { .. }
            | ProviderError::Auth { .. }
            | ProviderError::Schema(_) => false,
        }
    }

    /// Server-requested delay before retrying, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Parse a model reply into a record.
///
/// Shared by every backend so schema validation behaves identically.
pub(crate) fn parse_record(text: &str) -> Result<BillExtraction, ProviderError> {
    let body = crate::pipeline::extract::strip_json_fences(text);
    serde_json::from_str(body).map_err(|e| ProviderError::Schema(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Timeout { secs: 5 }.is_transient());
        assert!(ProviderError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!ProviderError::Schema("missing field".into()).is_transient());
        assert!(!ProviderError::Auth {
            provider: "gemini".into(),
            detail: "invalid key".into()
        }
        .is_transient());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let e = ProviderError::RateLimited {
            provider: "gemini".into(),
            retry_after_secs: Some(7),
        };
        assert_eq!(e.retry_after_secs(), Some(7));
        assert_eq!(ProviderError::Transport("x".into()).retry_after_secs(), None);
    }

    #[test]
    fn parse_record_accepts_fenced_json() {
        let reply = "```json\n{\"provider\":{\"name\":\"Acme\"},\"document\":{},\"customer\":{},\"financials\":{},\"period_and_usage\":{}}\n```";
        let rec = parse_record(reply).unwrap();
        assert_eq!(rec.provider.name.as_deref(), Some("Acme"));
    }

    #[test]
    fn parse_record_reports_schema_errors() {
        let err = parse_record("the total is $45.230").unwrap_err();
        assert!(matches!(err, ProviderError::Schema(_)));
    }
}
