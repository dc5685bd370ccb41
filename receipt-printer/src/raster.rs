//! Thermal raster encoding
//!
//! Renders a [`CanonicalImage`] as a centered 24-dot bit-image command stream:
//! luminance, optional Lanczos downscale to the width cap, hard threshold at
//! 128 (no dithering), then one `ESC * 33` strip per 24 pixel rows.

use image::GrayImage;
use image::imageops::{self, FilterType};
use tracing::{debug, instrument};

use crate::canonical::CanonicalImage;
use crate::error::EncodeError;
use crate::escpos::{BYTES_PER_COLUMN, EscPosBuilder, STRIP_HEIGHT};

/// Luminance below this prints as a black dot
const THRESHOLD: u8 = 128;

/// Printable dots across 80 mm paper on a TG2480
pub const TG2480_PRINTABLE_WIDTH: u32 = 608;

/// Widest image rendered before downscaling
pub const DEFAULT_MAX_WIDTH: u32 = 512;

/// Geometry of the target print area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSettings {
    /// Physical horizontal dot capacity
    pub printable_width: u32,
    /// Encoder cap; wider images are downscaled to this
    pub max_width: u32,
}

impl RasterSettings {
    pub fn new(printable_width: u32, max_width: u32) -> Self {
        Self {
            printable_width,
            max_width,
        }
    }

    pub fn encode(&self, image: &CanonicalImage) -> Result<Vec<u8>, EncodeError> {
        encode(image, self.printable_width, self.max_width)
    }
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self::new(TG2480_PRINTABLE_WIDTH, DEFAULT_MAX_WIDTH)
    }
}

/// Encode an image into a complete print stream (init, margin, strips, cut)
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn encode(
    image: &CanonicalImage,
    printable_width: u32,
    max_width: u32,
) -> Result<Vec<u8>, EncodeError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EncodeError::ZeroSize {
            width: image.width(),
            height: image.height(),
        });
    }
    if max_width == 0 {
        return Err(EncodeError::InvalidMaxWidth);
    }

    let gray = fit_width(image.to_luma(), max_width);
    let (width, height) = gray.dimensions();
    let strip_width = u16::try_from(width).map_err(|_| EncodeError::TooWide(width))?;
    let margin = left_margin(printable_width, width);

    let strips = height.div_ceil(STRIP_HEIGHT);
    let mut b = EscPosBuilder::with_capacity(
        32 + strips as usize * (6 + width as usize * BYTES_PER_COLUMN),
    );

    b.init().left_margin(margin).line_spacing(0);

    let mut column = [0u8; BYTES_PER_COLUMN];
    for strip in 0..strips {
        let top = strip * STRIP_HEIGHT;
        b.bit_image_24(strip_width);
        for x in 0..width {
            for (byte_num, byte) in column.iter_mut().enumerate() {
                *byte = 0;
                for bit in 0..8 {
                    let y = top + byte_num as u32 * 8 + bit;
                    if y < height && gray.get_pixel(x, y).0[0] < THRESHOLD {
                        *byte |= 0x80 >> bit;
                    }
                }
            }
            b.raw(&column);
        }
        b.newline();
    }

    b.default_line_spacing().cut_and_retract();

    let data = b.build();
    debug!(
        width,
        height,
        margin,
        strips,
        bytes = data.len(),
        "Raster encoded"
    );
    Ok(data)
}

/// Left margin that centers `width` dots in the printable area
///
/// Clamped at zero when the image is wider than the printable area.
pub fn left_margin(printable_width: u32, width: u32) -> u16 {
    let margin = printable_width.saturating_sub(width) / 2;
    u16::try_from(margin).unwrap_or(u16::MAX)
}

/// Downscale (aspect preserving) so the width does not exceed `max_width`
fn fit_width(gray: GrayImage, max_width: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w <= max_width {
        return gray;
    }

    let new_h = ((u64::from(h) * u64::from(max_width)) / u64::from(w)).max(1) as u32;
    debug!(
        orig_w = w,
        orig_h = h,
        new_w = max_width,
        new_h,
        "Downscaling image"
    );
    imageops::resize(&gray, max_width, new_h, FilterType::Lanczos3)
}
