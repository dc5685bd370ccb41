//! Queue error types

use std::path::PathBuf;

use receipt_printer::{DecodeError, EncodeError, PrintError};
use thiserror::Error;

use super::types::JobStatus;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Rejected at admission, nothing persisted
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt queue file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Why a dispatch attempt failed; recorded on the job, never returned to a caller
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("DecodeError: {0}")]
    Decode(#[from] DecodeError),

    #[error("EncodeError: {0}")]
    Encode(#[from] EncodeError),

    #[error("TransportError: {0}")]
    Transport(PrintError),

    #[error("RenderError: {0}")]
    Render(String),
}

impl From<PrintError> for JobFailure {
    fn from(e: PrintError) -> Self {
        match e {
            PrintError::Decode(e) => JobFailure::Decode(e),
            PrintError::Encode(e) => JobFailure::Encode(e),
            other => JobFailure::Transport(other),
        }
    }
}
