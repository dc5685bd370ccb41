use thiserror::Error;

use super::config::ConfigError;
use crate::queue::QueueError;

/// Startup and lifecycle errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Job queue unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("Printer setup failed: {0}")]
    Printer(#[from] receipt_printer::PrintError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
