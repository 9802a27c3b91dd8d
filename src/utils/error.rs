//! Error types and handling
//!
//! Common error types used across the application.

use crate::capture::traits::CaptureError;
use crate::recorder::channel::RecorderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Invalid artifact reference: {0}")]
    InvalidArtifactRef(String),

    #[error("No recording in progress")]
    NotRecording,
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Capture(CaptureError::PermissionDenied(_)) => "PERMISSION_DENIED",
            AppError::Capture(CaptureError::NotSupported(_)) => "NOT_SUPPORTED",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Recorder(_) => "RECORDER_ERROR",
            AppError::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            AppError::InvalidArtifactRef(_) => "INVALID_ARTIFACT_REF",
            AppError::NotRecording => "NOT_RECORDING",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
