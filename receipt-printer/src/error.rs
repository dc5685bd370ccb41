//! Error types for the printer library

use thiserror::Error;

/// Payload could not be turned into a canonical image
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing to decode
    #[error("Empty image payload")]
    Empty,

    /// Text payload was not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Decoded bytes are not a recognised image type
    #[error("Unsupported MIME type: {0}")]
    UnsupportedFormat(String),

    /// The image codec rejected the bytes
    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),

    /// The payload source could not be read
    #[error("Payload unreadable: {0}")]
    Unreadable(String),
}

/// Canonical image could not be rendered to a command stream
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Image has zero size: {width}x{height}")]
    ZeroSize { width: u32, height: u32 },

    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },

    #[error("Maximum width must be positive")]
    InvalidMaxWidth,

    #[error("Image width {0} does not fit the raster header")]
    TooWide(u32),
}

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Printer is offline or unreachable
    #[error("Printer offline: {0}")]
    Offline(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// No printer registered under this name
    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    /// Windows-specific printing error
    #[cfg(windows)]
    #[error("Windows printer error: {0}")]
    WindowsPrinter(String),
}

impl PrintError {
    /// Whether the failure came from the transport rather than rendering
    pub fn is_transport(&self) -> bool {
        !matches!(self, PrintError::Decode(_) | PrintError::Encode(_))
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
