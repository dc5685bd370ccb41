//! Image normalization
//!
//! Turns a caller payload (raw encoded bytes, base64 text or a `data:` URI)
//! into a [`CanonicalImage`]: 8-bit pixels with explicit dimensions and
//! channel layout, transparency already flattened onto white paper.
//!
//! Paletted images come out of the codec as RGBA when the palette carries a
//! transparency entry and as RGB otherwise, so both cases flow through the
//! same compositing path below.

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use tracing::{debug, instrument};

use crate::error::{DecodeError, EncodeError};

/// Channel layout of a canonical pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// One luminance byte per pixel
    Luma,
    /// Three bytes per pixel, R G B
    Rgb,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Luma => 1,
            PixelLayout::Rgb => 3,
        }
    }
}

/// Decoded, alpha-free pixel buffer ready for encoding
///
/// Rows are stored top to bottom, pixels left to right, 8 bits per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

impl CanonicalImage {
    /// Wrap a raw pixel buffer, checking its length against the dimensions
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<u8>,
    ) -> Result<Self, EncodeError> {
        let expected = width as usize * height as usize * layout.channels();
        if pixels.len() != expected {
            return Err(EncodeError::BufferMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            pixels,
        })
    }

    pub fn from_luma(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            layout: PixelLayout::Luma,
            pixels: img.into_raw(),
        }
    }

    pub fn from_rgb(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            layout: PixelLayout::Rgb,
            pixels: img.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Bits per channel (always 8)
    pub fn channel_depth(&self) -> u8 {
        8
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Single-channel luminance view (ITU-R 601-2 weights for RGB input)
    pub fn to_luma(&self) -> GrayImage {
        let data = match self.layout {
            PixelLayout::Luma => self.pixels.clone(),
            PixelLayout::Rgb => self
                .pixels
                .chunks_exact(3)
                .map(|p| luma(p[0], p[1], p[2]))
                .collect(),
        };
        GrayImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

/// Decode and normalize an image payload
#[instrument(skip(raw), fields(len = raw.len()))]
pub fn normalize(raw: &[u8]) -> Result<CanonicalImage, DecodeError> {
    let bytes = unwrap_payload(raw)?;

    let format = image::guess_format(&bytes)
        .map_err(|_| DecodeError::UnsupportedFormat("application/octet-stream".to_string()))?;
    let mime = format.to_mime_type();
    if !mime.starts_with("image/") {
        return Err(DecodeError::UnsupportedFormat(mime.to_string()));
    }

    let img = image::load_from_memory_with_format(&bytes, format)?;
    debug!(
        mime,
        width = img.width(),
        height = img.height(),
        color = ?img.color(),
        "Image decoded"
    );

    Ok(flatten(img))
}

/// Strip transport wrappers (data URI, base64) down to encoded image bytes
///
/// Bytes that already look like an encoded image are returned unchanged.
pub fn unwrap_payload(raw: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }

    let decoded = if raw.starts_with(b"data:")
        && let Some(comma) = raw.iter().position(|&b| b == b',')
    {
        Cow::Owned(decode_base64(&raw[comma + 1..])?)
    } else if image::guess_format(raw).is_ok() {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(decode_base64(raw)?)
    };

    if decoded.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(decoded)
}

fn decode_base64(text: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(STANDARD.decode(compact)?)
}

/// Reduce to 8-bit Luma or RGB; images with alpha become Luma pasted onto white
fn flatten(img: DynamicImage) -> CanonicalImage {
    let color = img.color();
    match (color.has_color(), color.has_alpha()) {
        (false, false) => CanonicalImage::from_luma(img.into_luma8()),
        (true, false) => CanonicalImage::from_rgb(img.into_rgb8()),
        (false, true) => {
            let la = img.into_luma_alpha8();
            let (width, height) = la.dimensions();
            let pixels = la
                .pixels()
                .map(|p| composite_on_white(p.0[0], p.0[1]))
                .collect();
            CanonicalImage {
                width,
                height,
                layout: PixelLayout::Luma,
                pixels,
            }
        }
        (true, true) => {
            let rgba = img.into_rgba8();
            let (width, height) = rgba.dimensions();
            let pixels = rgba
                .pixels()
                .map(|p| {
                    let [r, g, b, a] = p.0;
                    composite_on_white(luma(r, g, b), a)
                })
                .collect();
            CanonicalImage {
                width,
                height,
                layout: PixelLayout::Luma,
                pixels,
            }
        }
    }
}

/// Blend a grey value over white paper with the given coverage
fn composite_on_white(value: u8, alpha: u8) -> u8 {
    let v = u32::from(value);
    let a = u32::from(alpha);
    ((v * a + 255 * (255 - a) + 127) / 255) as u8
}

/// ITU-R 601-2 luma transform in 16-bit fixed point
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((19595 * u32::from(r) + 38470 * u32::from(g) + 7471 * u32::from(b) + 0x8000) >> 16) as u8
}

/// Encode an in-memory image as PNG bytes
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
