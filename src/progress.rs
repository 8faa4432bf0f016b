//! Progress-callback trait for extraction stage events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to hear
//! about each stage as it happens; the CLI uses this to drive its spinner.
//!
//! # Example
//!
//! ```rust
//! use bill_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ExtractionProgressCallback for Log {
//!     fn on_extraction_complete(&self, duration_ms: u64) {
//!         eprintln!("model answered in {duration_ms}ms");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Log) as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the workflow as it moves through its stages.
///
/// All methods default to no-ops so callers only override what they need.
pub trait ExtractionProgressCallback: Send + Sync {
    /// The image was read successfully.
    fn on_load_complete(&self, path: &Path, bytes: usize, mime_type: &str) {
        let _ = (path, bytes, mime_type);
    }

    /// The model request is about to be sent.
    fn on_extraction_start(&self, model: &str) {
        let _ = model;
    }

    /// The model returned a valid record.
    fn on_extraction_complete(&self, duration_ms: u64) {
        let _ = duration_ms;
    }

    /// The run ended with an error; `message` is what the user will see.
    fn on_error(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        loads: AtomicUsize,
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_load_complete(&self, _path: &Path, _bytes: usize, _mime_type: &str) {
            self.loads.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_start(&self, _model: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_extraction_complete(&self, _duration_ms: u64) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _message: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_load_complete(Path::new("bill.png"), 10, "image/png");
        cb.on_extraction_start("gemini/gemini-2.5-flash");
        cb.on_extraction_complete(1200);
        cb.on_error("Extraction failed: boom");
    }

    #[test]
    fn arc_dyn_callback_receives_events() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();

        cb.on_load_complete(Path::new("bill.png"), 10, "image/png");
        cb.on_extraction_start("stub");
        cb.on_error("Extraction failed: boom");

        assert_eq!(tracker.loads.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 0);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
