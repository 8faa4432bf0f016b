//! The two-stage extraction workflow and its public entry points.
//!
//! ```text
//! WorkflowState ──▶ load_step ──▶ extract_step ──▶ into_output
//!  (path)           (Loader)      (Extractor)      {"error": …} | record
//! ```
//!
//! Each step checks `state.error` first and passes a failed state through
//! untouched, so the first error wins and nothing runs after it. The loaded
//! payload travels inside the state; the extractor never re-reads the file.
//!
//! Callers who prefer `Result` over a state value use [`extract_bill`].

use crate::config::ExtractionConfig;
use crate::error::{BillError, ExtractionError};
use crate::pipeline::extract::Extractor;
use crate::pipeline::load::{load_image, ImagePayload};
use crate::record::BillExtraction;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Pending,
    Success,
    Failure,
}

/// Transient per-run state.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub image_path: PathBuf,
    pub image: Option<ImagePayload>,
    pub error: Option<String>,
    pub extracted_data: Option<Value>,
}

impl WorkflowState {
    pub fn new(image_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            image: None,
            error: None,
            extracted_data: None,
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        if self.error.is_some() {
            WorkflowStatus::Failure
        } else if self.extracted_data.is_some() {
            WorkflowStatus::Success
        } else {
            WorkflowStatus::Pending
        }
    }

    fn fail(mut self, error: &BillError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// The document printed for the user: the record, or `{"error": …}`.
    pub fn into_output(self) -> Value {
        match (self.error, self.extracted_data) {
            (Some(e), _) => json!({ "error": e }),
            (None, Some(data)) => data,
            (None, None) => json!({ "error": "Extraction failed: workflow did not run" }),
        }
    }
}

/// Runs the loader and extractor for one configuration.
#[derive(Debug, Clone)]
pub struct Workflow {
    config: ExtractionConfig,
}

impl Workflow {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Read the image into the state.
    pub fn load_step(&self, mut state: WorkflowState) -> WorkflowState {
        if state.error.is_some() {
            return state;
        }

        match self.load(&state.image_path) {
            Ok(payload) => {
                state.image = Some(payload);
                state
            }
            Err(err) => state.fail(&err),
        }
    }

    /// Ask the model for the record. Skipped when the state already failed.
    pub async fn extract_step(&self, mut state: WorkflowState) -> WorkflowState {
        if state.error.is_some() {
            return state;
        }

        let Some(image) = state.image.as_ref() else {
            let err = BillError::Internal("extract_step called before load_step".into());
            self.report(&err);
            return state.fail(&err);
        };

        let result = self.extract_payload(image).await;
        match result {
            Ok(record) => {
                state.extracted_data = Some(record.to_value());
                state
            }
            Err(err) => {
                self.report(&err);
                state.fail(&err)
            }
        }
    }

    /// Run both steps for `path`.
    pub async fn run(&self, path: impl Into<PathBuf>) -> WorkflowState {
        let state = WorkflowState::new(path);
        info!("Starting extraction for {}", state.image_path.display());
        let state = self.load_step(state);
        self.extract_step(state).await
    }

    /// Run both steps, returning a typed result instead of a state.
    pub async fn extract(&self, path: impl AsRef<Path>) -> Result<BillExtraction, BillError> {
        let path = path.as_ref();
        info!("Starting extraction for {}", path.display());
        let image = self.load(path)?;
        self.extract_payload(&image).await.map_err(|err| {
            self.report(&err);
            err
        })
    }

    /// Read `path`, firing the load callback or reporting the failure.
    fn load(&self, path: &Path) -> Result<ImagePayload, BillError> {
        match load_image(path, self.config.mime_override.as_deref()) {
            Ok(payload) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_load_complete(path, payload.len(), &payload.mime_type);
                }
                Ok(payload)
            }
            Err(e) => {
                let err = BillError::from(e);
                self.report(&err);
                Err(err)
            }
        }
    }

    async fn extract_payload(&self, image: &ImagePayload) -> Result<BillExtraction, BillError> {
        let model = self
            .config
            .resolve_model()
            .map_err(|e| BillError::Extraction(ExtractionError::from(e)))?;
        let extractor = Extractor::new(model, &self.config);

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_start(&extractor.model_name());
        }

        let start = Instant::now();
        let record = extractor.extract(image).await?;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Extraction complete: {} fields in {}ms",
            record.populated_fields(),
            duration_ms
        );

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_extraction_complete(duration_ms);
        }
        Ok(record)
    }

    fn report(&self, err: &BillError) {
        warn!("{}", err);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_error(&err.to_string());
        }
    }
}

/// Run the workflow for `path` and return its final state.
pub async fn run_workflow(path: impl Into<PathBuf>, config: &ExtractionConfig) -> WorkflowState {
    Workflow::new(config.clone()).run(path).await
}

/// Extract the record from the bill image at `path`.
///
/// # Errors
/// [`BillError::Load`] when the file cannot be read, [`BillError::Extraction`]
/// when the provider is unconfigured (e.g. no API key), the call fails, or
/// the reply does not match the schema.
///
/// # Example
/// ```rust,no_run
/// use bill_extract::{extract_bill, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ExtractionConfig::builder().api_key("AIza...").build()?;
/// let record = extract_bill("bill.png", &config).await?;
/// println!("{:?}", record.financials.total_amount);
/// # Ok(())
/// # }
/// ```
pub async fn extract_bill(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BillExtraction, BillError> {
    Workflow::new(config.clone()).extract(path).await
}

/// Synchronous wrapper around [`extract_bill`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_bill_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BillExtraction, BillError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BillError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_bill(path, config))
}

/// Extract and write the pretty-printed record to `output_path`.
pub async fn extract_bill_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<BillExtraction, BillError> {
    let record = extract_bill(path, config).await?;
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| BillError::Internal(format!("serialise record: {e}")))?;
    write_output(output_path.as_ref(), &json).await?;
    Ok(record)
}

/// Write `contents` plus a trailing newline to `path`, creating parent
/// directories.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_output(path: &Path, contents: &str) -> Result<(), BillError> {
    let write_err = |source: std::io::Error| BillError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, format!("{contents}\n"))
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}
