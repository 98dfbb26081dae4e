//! Payload compression.
//!
//! A compressed payload is the original size followed by an LZ4 frame:
//!
//! ```text
//! +------------------------+-----------------------+
//! | Original size (1-4 B)  | LZ4 frame             |
//! +------------------------+-----------------------+
//! ```
//!
//! The top two bits of the first size byte give the width of the size field
//! (`01` = 1, `10` = 2, `11` = 3, `00` = 4 bytes). The remaining bits hold
//! the size, big-endian, so sizes are limited to `0x3FFF_FFFF`.

use std::io::{Read, Write};

use lz4_flex::frame::{FrameDecoder, FrameEncoder};

use crate::{OverlayError, Result};

/// Largest size the prefix can represent.
pub const MAX_ORIGINAL_SIZE: u32 = 0x3FFF_FFFF;

/// Upper bound on LZ4 expansion per compressed byte.
const MAX_EXPANSION: usize = 256;

/// Compression algorithm selector, header bits 30..28.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Algorithm {
    None = 0,
    Lz4 = 1,
}

impl Algorithm {
    /// Decode the 3-bit selector.
    pub fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(Algorithm::None),
            1 => Ok(Algorithm::Lz4),
            other => Err(OverlayError::UnsupportedAlgorithm(other)),
        }
    }
}

/// Encode `size` as a 1-4 byte prefix.
pub fn write_size(size: u32) -> Result<Vec<u8>> {
    let width: usize = match size {
        0..=0x3F => 1,
        0x40..=0x3FFF => 2,
        0x4000..=0x3F_FFFF => 3,
        0x40_0000..=MAX_ORIGINAL_SIZE => 4,
        _ => {
            return Err(OverlayError::Compression(format!(
                "size {} exceeds {}",
                size, MAX_ORIGINAL_SIZE
            )))
        }
    };
    let tag = (width as u32 & 0x3) << 30;
    let shifted = (size << (8 * (4 - width))) | tag;
    Ok(shifted.to_be_bytes()[..width].to_vec())
}

/// Decode a size prefix. Returns `(size, prefix_width)`.
pub fn read_size(buf: &[u8]) -> Result<(u32, usize)> {
    let first = *buf
        .first()
        .ok_or_else(|| OverlayError::Compression("missing size prefix".to_string()))?;
    let width = match first >> 6 {
        0 => 4,
        n => n as usize,
    };
    if buf.len() < width {
        return Err(OverlayError::Compression(format!(
            "truncated size prefix: need {} bytes, have {}",
            width,
            buf.len()
        )));
    }
    let mut word = [0u8; 4];
    word[..width].copy_from_slice(&buf[..width]);
    let size = (u32::from_be_bytes(word) & MAX_ORIGINAL_SIZE) >> (8 * (4 - width));
    Ok((size, width))
}

/// Compress a payload into size prefix + LZ4 frame.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    let size = u32::try_from(payload.len()).map_err(|_| {
        OverlayError::Compression(format!("payload of {} bytes", payload.len()))
    })?;
    let out = write_size(size)?;
    let mut encoder = FrameEncoder::new(out);
    encoder.write_all(payload)?;
    encoder
        .finish()
        .map_err(|e| OverlayError::Compression(format!("lz4 frame: {}", e)))
}

/// Decompress a size-prefixed LZ4 frame.
///
/// Fails if the frame is corrupt, if the declared size exceeds `limit`, or
/// if the frame does not decode to exactly the declared size.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let (size, width) = read_size(data)?;
    let size = size as usize;
    if size > limit {
        return Err(OverlayError::MessageTooLarge { size, limit });
    }

    let mut out = Vec::with_capacity(initial_capacity(size, data.len() - width));
    FrameDecoder::new(&data[width..])
        .take(size as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| OverlayError::Compression(format!("lz4 frame: {}", e)))?;
    if out.len() != size {
        return Err(OverlayError::Compression(format!(
            "decompressed {} bytes, expected {}",
            out.len(),
            size
        )));
    }
    Ok(out)
}

/// Preallocation for a declared size. The declared size comes from the
/// peer, so it is capped by what the compressed bytes could expand to.
fn initial_capacity(declared: usize, compressed_len: usize) -> usize {
    declared.min(compressed_len.saturating_mul(MAX_EXPANSION))
}
