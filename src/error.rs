//! Error types for the bill-extract library.
//!
//! The two pipeline stages each own an error type:
//!
//! * [`LoadError`] — the image could not be read from disk.
//! * [`ExtractionError`] — the model call, or validation of its response,
//!   failed.
//!
//! [`BillError`] wraps both for the typed entry points in
//! [`crate::workflow`], and adds the failures that happen around the
//! pipeline (bad configuration, writing the output file). Its `Display`
//! strings are the exact messages printed in the `{"error": …}` document.

use crate::model::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to read the input image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing exists at the given path.
    #[error("image file not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    /// The process lacks read permission on the file.
    #[error("permission denied reading '{}'", path.display())]
    PermissionDenied { path: PathBuf },

    /// The file is present but contains no bytes.
    #[error("image file '{}' is empty", path.display())]
    Empty { path: PathBuf },

    /// Any other I/O failure while opening or reading.
    #[error("could not read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Path of the file that failed to load.
    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::NotFound { path }
            | LoadError::PermissionDenied { path }
            | LoadError::Empty { path }
            | LoadError::Read { path, .. } => path,
        }
    }
}

/// Failure while asking the model for the extraction record.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The provider returned an error or a response that did not match the
    /// schema.
    #[error("{source}")]
    Provider {
        #[from]
        source: ProviderError,
    },

    /// A retryable error persisted through every configured retry.
    #[error("gave up after {retries} retries: {last}")]
    RetriesExhausted { retries: u32, last: ProviderError },
}

/// All fatal errors returned by the typed entry points.
#[derive(Debug, Error)]
pub enum BillError {
    #[error("Failed to load image: {0}")]
    Load(#[from] LoadError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{}': {source}", path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
