//! Error types for the ingest pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Requiring a fresh diff with no worker configured is an integration
    /// defect, not a runtime condition; it is never retried.
    #[error("No diff worker configured, but a diff image must be generated for {test_id}")]
    NoDiffWorker { test_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker failure: {0}")]
    Worker(String),

    #[error(transparent)]
    Common(#[from] retake_common::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
