//! # bill-extract
//!
//! Extract structured billing metadata from a photo or scan of a utility
//! bill using a Vision Language Model (VLM).
//!
//! Bills vary wildly in layout, language and print quality; instead of
//! template matching, this crate hands the image to a hosted vision model
//! together with a fixed instruction and a response schema, and gets back a
//! [`BillExtraction`] with provider, document, customer, financial and
//! billing-period fields. Every field is optional and serialises as an
//! explicit `null` when absent.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image path
//!  │
//!  ├─ 1. Load     read bytes, detect image/png or image/jpeg
//!  ├─ 2. Extract  one structured-output call to gemini / openai / claude / …
//!  └─ 3. Output   the record as JSON, or {"error": "…"}
//! ```
//!
//! A failure in any stage is recorded once and every later stage passes it
//! through unchanged: no partial results.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bill_extract::{extract_bill, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Native Gemini backend; credentials are always passed in explicitly.
//!     let config = ExtractionConfig::builder()
//!         .api_key(std::env::var("GOOGLE_API_KEY")?)
//!         .build()?;
//!     let record = extract_bill("bill.jpg", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&record)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `bill-extract` binary (clap + anyhow + tracing-subscriber + dotenvy) |
//!
//! ## Backends
//!
//! | Provider | Structured output | Notes |
//! |----------|-------------------|-------|
//! | `gemini` (default) | native `responseSchema` | `gemini-2.5-flash` unless overridden |
//! | any `edgequake-llm` provider | schema in prompt, validated locally | `openai`, `anthropic`, `ollama`, … |
//!
//! Tests and embedders can supply their own [`BillModel`] through
//! [`ExtractionConfigBuilder::provider`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{BillError, ExtractionError, LoadError};
pub use model::{BillModel, GeminiModel, LlmProviderModel, ProviderError};
pub use pipeline::extract::Extractor;
pub use pipeline::load::{load_image, ImagePayload};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{BillExtraction, Customer, DocumentInfo, FieldWarning, Financials, PeriodAndUsage, Provider};
pub use workflow::{
    extract_bill, extract_bill_sync, extract_bill_to_file, run_workflow, write_output, Workflow,
    WorkflowState, WorkflowStatus,
};
