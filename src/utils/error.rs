//! Error types and handling
//!
//! Common error types used across the recorder.

use crate::recorder::writer::WriterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Cannot clear session state while recording")]
    ClearWhileRecording,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No async runtime available to run segment finalization")]
    NoRuntime,

    #[error("Segment writer error: {0}")]
    Writer(#[from] WriterError),
}

/// Serializable error payload attached to failed segment notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
            RecorderError::AlreadyRecording => "ALREADY_RECORDING",
            RecorderError::NotRecording => "NOT_RECORDING",
            RecorderError::ClearWhileRecording => "CLEAR_WHILE_RECORDING",
            RecorderError::InvalidConfig(_) => "INVALID_CONFIG",
            RecorderError::NoRuntime => "NO_RUNTIME",
            RecorderError::Writer(WriterError::Finalize(_)) => "FINALIZE_ERROR",
            RecorderError::Writer(_) => "WRITER_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<WriterError> for ErrorResponse {
    fn from(error: WriterError) -> Self {
        RecorderError::from(error).into()
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
