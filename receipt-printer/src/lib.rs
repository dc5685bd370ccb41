//! # receipt-printer
//!
//! ESC/POS thermal printer library - image rendering and raw transport only.
//!
//! ## Scope
//!
//! This crate handles HOW to print an image:
//! - Payload normalization (base64 / data URI / raw bytes → canonical pixels)
//! - 24-dot bit-image raster encoding, centered on the paper
//! - Network printing (TCP port 9100)
//! - Windows driver printing (RAW spooling)
//!
//! Queueing, retries and persistence (WHEN to print) live in `print-server`.
//!
//! ## Example
//!
//! ```ignore
//! use receipt_printer::{NetworkTransport, PrinterTransport, RasterSettings, normalize};
//!
//! let image = normalize(payload)?;
//! let data = RasterSettings::default().encode(&image)?;
//!
//! let transport = NetworkTransport::from_list("counter=192.168.1.100:9100")?;
//! transport.send_raw("counter", &data).await?;
//! ```

mod canonical;
mod error;
mod escpos;
mod printer;
mod raster;

// Re-exports
pub use canonical::{CanonicalImage, PixelLayout, encode_png, normalize, unwrap_payload};
pub use error::{DecodeError, EncodeError, PrintError, PrintResult};
pub use escpos::{EscPosBuilder, STRIP_HEIGHT, TG2480_CUT_AND_RETRACT, le_pair};
pub use printer::{NetworkTransport, PrinterInfo, PrinterTransport, RAW_PORT};
pub use raster::{
    DEFAULT_MAX_WIDTH, RasterSettings, TG2480_PRINTABLE_WIDTH, encode, left_margin,
};

#[cfg(windows)]
pub use printer::WindowsSpooler;

/// Normalize and encode a payload in one step
pub fn render(payload: &[u8], settings: &RasterSettings) -> PrintResult<Vec<u8>> {
    let image = normalize(payload)?;
    Ok(settings.encode(&image)?)
}
