//! ESC/POS command builder
//!
//! Provides a fluent API for building the graphics-mode command stream.

/// Rows covered by one 24-dot bit-image strip
pub const STRIP_HEIGHT: u32 = 24;

/// Bytes per column in a 24-dot strip
pub const BYTES_PER_COLUMN: usize = 3;

/// Full cut followed by automatic paper back-feed (TG2480 family).
///
/// Pulls the paper back so the next ticket starts without a blank top margin.
pub const TG2480_CUT_AND_RETRACT: [u8; 7] = [0x1C, 0xC0, 0xAA, 0x0F, 0xEE, 0x0B, 0x34];

/// Split a value into the `nL nH` little-endian pair used by ESC/POS
pub fn le_pair(value: u16) -> [u8; 2] {
    [(value % 256) as u8, (value / 256) as u8]
}

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers.
pub struct EscPosBuilder {
    buf: Vec<u8>,
}

impl EscPosBuilder {
    /// Create an empty builder with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Current length of the command stream
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Initialize printer (ESC @)
    pub fn init(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x40]);
        self
    }

    /// Set left margin in dots (GS L nL nH)
    pub fn left_margin(&mut self, dots: u16) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x4C]);
        self.buf.extend_from_slice(&le_pair(dots));
        self
    }

    /// Set line spacing in dots (ESC 3 n)
    pub fn line_spacing(&mut self, dots: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x33, dots]);
        self
    }

    /// Restore the default line spacing (ESC 2)
    pub fn default_line_spacing(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x32]);
        self
    }

    /// Start a 24-dot double-density bit image strip (ESC * 33 nL nH)
    ///
    /// Must be followed by exactly `width * 3` column bytes.
    pub fn bit_image_24(&mut self, width: u16) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x2A, 0x21]);
        self.buf.extend_from_slice(&le_pair(width));
        self
    }

    /// Line feed
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(0x0A);
        self
    }

    /// Full cut with paper retract
    pub fn cut_and_retract(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&TG2480_CUT_AND_RETRACT);
        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Build the final byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::with_capacity(4096)
    }
}
