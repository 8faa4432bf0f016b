//! Workflow tests against a stub model.
//!
//! No network: every test injects a `BillModel` that returns a canned record
//! (or error) and counts how often it was called.

use async_trait::async_trait;
use bill_extract::{
    extract_bill, extract_bill_to_file, run_workflow, BillError, BillExtraction, BillModel,
    ExtractionConfig, ExtractionProgressCallback, ImagePayload, ProviderError, WorkflowStatus,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

struct StubModel {
    reply: Result<BillExtraction, ProviderError>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(String, ImagePayload)>>,
}

impl StubModel {
    fn returning(record: BillExtraction) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(record),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(err),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillModel for StubModel {
    fn name(&self) -> String {
        "stub".to_string()
    }

    async fn invoke(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> Result<BillExtraction, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((instruction.to_string(), image.clone()));
        self.reply.clone()
    }
}

fn config_with(model: Arc<StubModel>) -> ExtractionConfig {
    ExtractionConfig::builder()
        .provider(model as Arc<dyn BillModel>)
        .build()
        .expect("valid config")
}

/// Write a small white PNG (whatever the extension) and return its path.
fn write_png(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    image::RgbImage::from_pixel(16, 16, image::Rgb([255, 255, 255]))
        .save_with_format(&path, image::ImageFormat::Png)
        .expect("write png");
    path
}

fn acme_document() -> Value {
    json!({
        "provider": { "name": "Acme Power", "contact_info": null },
        "document": { "type": "Electronic Bill", "number": "F-0042", "issue_date": "2024-03-01" },
        "customer": {
            "name": "María Pérez",
            "client_id": "123456-7",
            "tax_id": null,
            "address": "Av. Siempre Viva 742, Santiago"
        },
        "financials": {
            "total_amount": 45230.0,
            "currency": "CLP",
            "due_date": "2024-03-20",
            "status": "Pending"
        },
        "period_and_usage": {
            "billing_period_start": "2024-01-28",
            "billing_period_end": "2024-02-27",
            "cutoff_date": null,
            "tariff_type": "BT1"
        }
    })
}

fn full_document() -> Value {
    let mut doc = acme_document();
    doc["provider"]["contact_info"] = json!("600 600 1234");
    doc["customer"]["tax_id"] = json!("12.345.678-9");
    doc["period_and_usage"]["cutoff_date"] = json!("2024-04-05");
    doc
}

fn record(doc: &Value) -> BillExtraction {
    serde_json::from_value(doc.clone()).expect("document matches schema")
}

// ── Loader failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_file_never_reaches_the_model() {
    let model = StubModel::returning(BillExtraction::empty());
    let state = run_workflow("missing.png", &config_with(model.clone())).await;

    assert_eq!(state.status(), WorkflowStatus::Failure);
    assert_eq!(model.calls(), 0);

    let out = state.into_output();
    let msg = out["error"].as_str().expect("error document");
    assert!(msg.starts_with("Failed to load image: "), "got: {msg}");
    assert!(msg.contains("missing.png"));
    assert_eq!(out.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_file_typed_api_is_load_error() {
    let model = StubModel::returning(BillExtraction::empty());
    let err = extract_bill("/no/such/dir/bill.jpg", &config_with(model.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, BillError::Load(_)), "got: {err:?}");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn missing_file_wins_over_missing_credentials() {
    // No provider and (very likely) no API key: the load error still comes first.
    let config = ExtractionConfig::builder()
        .provider_name("gemini")
        .build()
        .unwrap();
    let state = run_workflow("missing.png", &config).await;
    let out = state.into_output();
    assert!(out["error"].as_str().unwrap().starts_with("Failed to load image"));
}

// ── Pass-through ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn populated_response_passes_through_unchanged() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::returning(record(&full_document()));

    let state = run_workflow(&png, &config_with(model.clone())).await;

    assert_eq!(state.status(), WorkflowStatus::Success);
    assert_eq!(state.into_output(), full_document());
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn null_leaves_are_preserved() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::returning(record(&acme_document()));

    let out = run_workflow(&png, &config_with(model)).await.into_output();

    assert_eq!(out, acme_document());
    assert_eq!(out["provider"]["contact_info"], Value::Null);
    assert_eq!(out["period_and_usage"]["cutoff_date"], Value::Null);
    assert!(out["customer"].as_object().unwrap().contains_key("tax_id"));
}

#[tokio::test]
async fn empty_record_keeps_every_key() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::returning(BillExtraction::empty());

    let out = run_workflow(&png, &config_with(model)).await.into_output();
    let leaves: usize = out
        .as_object()
        .unwrap()
        .values()
        .map(|section| section.as_object().unwrap().len())
        .sum();
    assert_eq!(leaves, 17);
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::returning(record(&acme_document()));
    let config = config_with(model.clone());

    let first = run_workflow(&png, &config).await.into_output();
    let second = run_workflow(&png, &config).await.into_output();

    assert_eq!(first, second);
    assert_eq!(model.calls(), 2);
}

#[test]
fn full_record_round_trips_through_json() {
    let rec = record(&full_document());
    let text = serde_json::to_string_pretty(&rec).unwrap();
    let back: BillExtraction = serde_json::from_str(&text).unwrap();
    assert_eq!(back, rec);
}

// ── What the model receives ──────────────────────────────────────────────────

#[tokio::test]
async fn model_receives_loaded_bytes_and_instruction() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "scan.jpg"); // PNG content, misleading extension
    let model = StubModel::returning(BillExtraction::empty());

    run_workflow(&png, &config_with(model.clone())).await;

    let seen = model.seen.lock().unwrap();
    let (instruction, image) = &seen[0];
    assert!(instruction.contains("YYYY-MM-DD"));
    assert_eq!(image.mime_type, "image/png");
    assert_eq!(image.bytes, std::fs::read(&png).unwrap());
}

#[tokio::test]
async fn custom_instruction_and_mime_override_are_used() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::returning(BillExtraction::empty());
    let config = ExtractionConfig::builder()
        .provider(model.clone() as Arc<dyn BillModel>)
        .instruction("Only the total, please.")
        .mime_override("image/jpeg")
        .build()
        .unwrap();

    run_workflow(&png, &config).await;

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen[0].0, "Only the total, please.");
    assert_eq!(seen[0].1.mime_type, "image/jpeg");
}

// ── Extractor failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn provider_error_becomes_extraction_error_document() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::failing(ProviderError::Schema("missing field `financials`".into()));

    let state = run_workflow(&png, &config_with(model.clone())).await;
    assert_eq!(state.status(), WorkflowStatus::Failure);
    assert!(state.extracted_data.is_none());

    let out = state.into_output();
    let msg = out["error"].as_str().unwrap();
    assert!(msg.starts_with("Extraction failed: "), "got: {msg}");
    assert!(msg.contains("financials"));
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn transient_error_is_retried_when_configured() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let model = StubModel::failing(ProviderError::RateLimited {
        provider: "stub".into(),
        retry_after_secs: None,
    });
    let config = ExtractionConfig::builder()
        .provider(model.clone() as Arc<dyn BillModel>)
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();

    let err = extract_bill(&png, &config).await.unwrap_err();
    assert!(err.to_string().contains("gave up after 2 retries"), "got: {err}");
    assert_eq!(model.calls(), 3);
}

// ── Progress events ──────────────────────────────────────────────────────────

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl ExtractionProgressCallback for EventLog {
    fn on_load_complete(&self, _path: &Path, _bytes: usize, mime_type: &str) {
        self.0.lock().unwrap().push(format!("load {mime_type}"));
    }
    fn on_extraction_start(&self, model: &str) {
        self.0.lock().unwrap().push(format!("start {model}"));
    }
    fn on_extraction_complete(&self, _duration_ms: u64) {
        self.0.lock().unwrap().push("complete".into());
    }
    fn on_error(&self, message: &str) {
        let kind = message.split(':').next().unwrap_or_default().to_string();
        self.0.lock().unwrap().push(format!("error {kind}"));
    }
}

#[tokio::test]
async fn progress_events_in_order() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let log = Arc::new(EventLog::default());
    let config = ExtractionConfig::builder()
        .provider(StubModel::returning(BillExtraction::empty()) as Arc<dyn BillModel>)
        .progress_callback(log.clone())
        .build()
        .unwrap();

    run_workflow(&png, &config).await;
    run_workflow("missing.png", &config).await;

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "load image/png",
            "start stub",
            "complete",
            "error Failed to load image",
        ]
    );
}

// ── File output ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn extract_to_file_writes_pretty_json() {
    let dir = TempDir::new().unwrap();
    let png = write_png(&dir, "bill.png");
    let out = dir.path().join("out/bill.json");
    let model = StubModel::returning(record(&acme_document()));

    extract_bill_to_file(&png, &out, &config_with(model))
        .await
        .expect("extraction succeeds");

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("María Pérez"), "non-ASCII must be preserved");
    assert!(text.contains("\n  \"provider\""));
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, acme_document());
    assert!(!dir.path().join("out/bill.json.tmp").exists());
}
