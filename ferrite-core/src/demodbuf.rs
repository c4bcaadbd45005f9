//! The demodulated bit stream and its framing metadata.
//!
//! Every element is a bit-valued byte: 0, 1, or the sentinel [`ERROR_BIT`]
//! where the demodulator could not decide. A single snapshot slot allows a
//! caller to save the buffer, run a destructive decode, and restore.

use crate::bits;
use crate::errors::{DemodError, Result};

/// Sentinel marking an undecodable symbol.
pub const ERROR_BIT: u8 = 7;

/// Printing stops after this many bits.
pub const PRINT_MAX_BITS: usize = 512;

/// Where the decoded bits sit relative to the sample trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Framing {
    /// Bit clock in samples per bit; 0 when unset.
    pub clock: usize,
    /// Sample index where the first decoded bit begins.
    pub start_idx: usize,
}

/// Options for rendering the buffer as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintOptions {
    pub offset: usize,
    pub strip_leading_zeroes: bool,
    pub invert: bool,
    pub hex: bool,
}

#[derive(Debug, Clone)]
pub struct DemodBuffer {
    bits: Vec<u8>,
    max_len: usize,
}

/// Snapshot of the buffer plus framing, copied by value.
#[derive(Debug, Clone)]
pub struct DemodSnapshot {
    pub bits: Vec<u8>,
    pub framing: Framing,
}

impl DemodBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            bits: Vec::new(),
            max_len,
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bits
    }

    /// Install a decoded stream, skipping `start` elements and truncating at
    /// the buffer maximum.
    pub fn set(&mut self, bits: &[u8], start: usize) {
        self.bits.clear();
        if start >= bits.len() {
            return;
        }
        let take = (bits.len() - start).min(self.max_len);
        self.bits.extend_from_slice(&bits[start..start + take]);
    }

    /// Keep only the first `len` elements.
    pub fn truncate(&mut self, len: usize) {
        self.bits.truncate(len);
    }

    /// True when every element is a decodable bit or the error sentinel.
    pub fn is_bit_stream(&self) -> bool {
        self.bits.iter().all(|&b| b <= ERROR_BIT)
    }

    /// Render the buffer per `opts`; errors on an empty buffer.
    pub fn render(&self, opts: PrintOptions) -> Result<String> {
        if self.bits.is_empty() {
            return Err(DemodError::EmptyDemodBuffer.into());
        }
        let mut offset = opts.offset.min(self.bits.len());
        if opts.strip_leading_zeroes {
            offset += self.bits[offset..]
                .iter()
                .position(|&b| b == 1)
                .unwrap_or(self.bits.len() - offset);
        }
        let mut view: Vec<u8> = self.bits[offset..]
            .iter()
            .take(PRINT_MAX_BITS)
            .copied()
            .collect();
        if opts.invert {
            for b in view.iter_mut() {
                match *b {
                    0 => *b = 1,
                    1 => *b = 0,
                    _ => {}
                }
            }
        }
        if opts.hex {
            let (hex, padded) = bits::bin_to_hex(&view);
            if padded > 0 {
                Ok(format!("{hex}\n[right padded with {padded} zeroes]"))
            } else {
                Ok(hex)
            }
        } else {
            Ok(bits::format_bin_break(&view, 32))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_skips_start_and_truncates() {
        let mut buf = DemodBuffer::new(4);
        buf.set(&[7, 1, 0, 1, 1, 0, 0], 1);
        assert_eq!(buf.as_slice(), &[1, 0, 1, 1]);
    }

    #[test]
    fn render_strips_to_first_one() {
        let mut buf = DemodBuffer::new(64);
        buf.set(&[0, 0, 0, 1, 0, 1, 1], 0);
        let out = buf
            .render(PrintOptions {
                strip_leading_zeroes: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(out, "1011");
    }

    #[test]
    fn render_invert_keeps_sentinels() {
        let mut buf = DemodBuffer::new(64);
        buf.set(&[1, 0, 7, 1], 0);
        let out = buf
            .render(PrintOptions {
                invert: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(out, "01.0");
    }

    #[test]
    fn render_hex() {
        let mut buf = DemodBuffer::new(64);
        buf.set(&[0, 1, 0, 1, 0, 1, 0, 1], 0);
        let out = buf.render(PrintOptions {
            hex: true,
            ..Default::default()
        });
        assert_eq!(out.unwrap(), "55");
    }

    #[test]
    fn render_empty_is_soft_error() {
        let buf = DemodBuffer::new(64);
        assert!(buf.render(PrintOptions::default()).is_err());
    }
}
