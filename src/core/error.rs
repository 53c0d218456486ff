use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Image at batch position {position} has id {id}")]
    BatchOrder { position: usize, id: usize },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DetectError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        DetectError::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
