use std::path::PathBuf;
use thiserror::Error;

/// The main error type for cooler-upload operations.
#[derive(Debug, Error)]
pub enum CoolerUploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse records JSON from {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write JSON report: {source}")]
    JsonWrite {
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record (item {item}): {message}")]
    InvalidRecord { item: usize, message: String },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Request to {endpoint} returned HTTP {status}")]
    RemoteStatus { endpoint: String, status: u16 },

    #[error("Project resolution failed: {0}")]
    ProjectResolution(String),

    #[error("Annotation upload for image {image_id} failed: {message}")]
    AnnotationRejected { image_id: String, message: String },

    #[error("Image re-encoding failed: {0}")]
    ImageEncode(String),

    #[error("{failed} of {total} image(s) failed to upload")]
    UploadIncomplete { failed: usize, total: usize },
}

impl CoolerUploadError {
    /// Image id left on the remote service without its annotations, if any.
    pub fn orphan_image_id(&self) -> Option<&str> {
        match self {
            CoolerUploadError::AnnotationRejected { image_id, .. } => Some(image_id),
            _ => None,
        }
    }

    /// Whether another attempt at the same unit could succeed.
    ///
    /// Input and geometry problems fail identically every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CoolerUploadError::InvalidRecord { .. }
                | CoolerUploadError::InvalidGeometry(_)
                | CoolerUploadError::ImageEncode(_)
        )
    }

    pub(crate) fn invalid_record(item: usize, message: impl Into<String>) -> Self {
        CoolerUploadError::InvalidRecord {
            item,
            message: message.into(),
        }
    }
}
