//! Loader: read the bill image from disk into an [`ImagePayload`].
//!
//! The payload is kept as raw bytes; base64 and data-URI forms are produced
//! on demand by the model backends. The MIME type comes from the caller when
//! asserted, otherwise from the file's magic bytes, then its extension, and
//! finally falls back to `image/jpeg`.

use crate::error::LoadError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// MIME type used when neither content nor extension identify the image.
pub const FALLBACK_MIME: &str = "image/jpeg";

/// An image ready to be embedded in a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// Read the image at `path`.
///
/// `mime_override` skips detection entirely.
pub fn load_image(path: impl AsRef<Path>, mime_override: Option<&str>) -> Result<ImagePayload, LoadError> {
    let path = path.as_ref();
    let bytes = read_file(path)?;

    if bytes.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let mime_type = match mime_override {
        Some(m) => m.to_string(),
        None => detect_mime(path, &bytes),
    };

    debug!(
        "Loaded {} ({} bytes, {})",
        path.display(),
        bytes.len(),
        mime_type
    );

    Ok(ImagePayload { bytes, mime_type })
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    let to_error = |e: std::io::Error, path: PathBuf| match e.kind() {
        ErrorKind::NotFound => LoadError::NotFound { path },
        ErrorKind::PermissionDenied => LoadError::PermissionDenied { path },
        _ => LoadError::Read { path, source: e },
    };

    let mut file = File::open(path).map_err(|e| to_error(e, path.to_path_buf()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| to_error(e, path.to_path_buf()))?;
    Ok(bytes)
}

/// Infer the MIME type from content, then extension.
pub fn detect_mime(path: &Path, bytes: &[u8]) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }

    if let Ok(format) = ImageFormat::from_path(path) {
        warn!(
            "Could not identify {} from its content; trusting the extension",
            path.display()
        );
        return format.to_mime_type().to_string();
    }

    warn!(
        "Could not identify {}; sending as {}",
        path.display(),
        FALLBACK_MIME
    );
    FALLBACK_MIME.to_string()
}
