//! Message envelope framing.
//!
//! Every peer message travels as a 6-byte header followed by its payload:
//!
//! ```text
//! +---+-----+------------------+--------------+---------------------+
//! | C | Alg | Length (28 bits) | Type (16 b)  | Payload             |
//! +---+-----+------------------+--------------+---------------------+
//!  31  30-28       27-0           bytes 4-5
//! ```
//!
//! # Header Word
//!
//! - **Bit 31**: compressed flag.
//! - **Bits 30-28**: compression algorithm ([`Algorithm`]); must be zero when
//!   the compressed flag is clear.
//! - **Bits 27-0**: payload length on the wire (after compression).
//!
//! # Compression
//!
//! A [`Message`] always carries its uncompressed frame. A compressed frame is
//! produced as well when the type is on the allow-list, the payload is larger
//! than the minimum size, and compression makes it strictly smaller. The
//! sender picks one with [`Message::buffer`].

use bytes::{Buf, BytesMut};
use ledgerwatch_common::config::{OverlayConfig, DEFAULT_COMPRESSION_MIN_SIZE};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::compression::{self, Algorithm};
use crate::message::MessageType;
use crate::{OverlayError, Result};

/// Size of the envelope header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Maximum payload size (64 MiB), compressed or not.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

const COMPRESSED_FLAG: u32 = 0x8000_0000;
const ALGORITHM_MASK: u32 = 0x7000_0000;
const LENGTH_MASK: u32 = 0x0FFF_FFFF;

/// Parsed envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Whether the payload on the wire is compressed.
    pub compressed: bool,
    /// Algorithm the payload is compressed with.
    pub algorithm: Algorithm,
    /// Payload bytes following the header.
    pub payload_wire_size: u32,
    pub message_type: MessageType,
}

impl MessageHeader {
    /// Parse a header from the start of `buf`.
    ///
    /// Returns `Ok(None)` if fewer than [`HEADER_SIZE`] bytes are available.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let word = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let compressed = word & COMPRESSED_FLAG != 0;
        let algorithm_bits = ((word & ALGORITHM_MASK) >> 28) as u8;

        let algorithm = if compressed {
            match Algorithm::from_bits(algorithm_bits)? {
                Algorithm::None => {
                    return Err(OverlayError::InvalidHeader(
                        "compressed flag set without an algorithm".to_string(),
                    ))
                }
                algorithm => algorithm,
            }
        } else if algorithm_bits != 0 {
            return Err(OverlayError::InvalidHeader(format!(
                "algorithm bits {:#x} set on an uncompressed header",
                algorithm_bits
            )));
        } else {
            Algorithm::None
        };

        let payload_wire_size = word & LENGTH_MASK;
        if payload_wire_size as usize > MAX_PAYLOAD_SIZE {
            return Err(OverlayError::MessageTooLarge {
                size: payload_wire_size as usize,
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Some(Self {
            compressed,
            algorithm,
            payload_wire_size,
            message_type: MessageType::from(u16::from_be_bytes([buf[4], buf[5]])),
        }))
    }

    /// Serialize the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut word = self.payload_wire_size & LENGTH_MASK;
        if self.compressed {
            word |= COMPRESSED_FLAG | ((self.algorithm as u32) << 28);
        }
        let word = word.to_be_bytes();
        let code = self.message_type.code().to_be_bytes();
        [word[0], word[1], word[2], word[3], code[0], code[1]]
    }

    /// Header plus payload size.
    pub fn total_wire_size(&self) -> usize {
        HEADER_SIZE + self.payload_wire_size as usize
    }
}

fn frame(header: MessageHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// An outbound message, framed and ready to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    buffer: Vec<u8>,
    buffer_compressed: Option<Vec<u8>>,
}

impl Message {
    /// Frame `payload`, also producing a compressed frame when eligible.
    pub fn new(
        message_type: MessageType,
        payload: &[u8],
        compression_enabled: bool,
    ) -> Result<Self> {
        Self::build(
            message_type,
            payload,
            compression_enabled,
            DEFAULT_COMPRESSION_MIN_SIZE,
        )
    }

    /// Frame `payload` using the overlay configuration.
    pub fn with_config(
        message_type: MessageType,
        payload: &[u8],
        config: &OverlayConfig,
    ) -> Result<Self> {
        Self::build(
            message_type,
            payload,
            config.compression_enabled,
            config.compression_min_size,
        )
    }

    fn build(
        message_type: MessageType,
        payload: &[u8],
        compression_enabled: bool,
        min_size: usize,
    ) -> Result<Self> {
        if payload.is_empty() {
            return Err(OverlayError::InvalidMessage(format!(
                "empty {} payload",
                message_type
            )));
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(OverlayError::MessageTooLarge {
                size: payload.len(),
                limit: MAX_PAYLOAD_SIZE,
            });
        }

        let header = MessageHeader {
            compressed: false,
            algorithm: Algorithm::None,
            payload_wire_size: payload.len() as u32,
            message_type,
        };
        let buffer = frame(header, payload);

        let compressible =
            compression_enabled && message_type.is_compressible() && payload.len() > min_size;
        let buffer_compressed = if compressible {
            let compressed = compression::compress(payload)?;
            if compressed.len() < payload.len() {
                trace!(
                    message_type = %message_type,
                    size = payload.len(),
                    compressed = compressed.len(),
                    "Compressed message"
                );
                let header = MessageHeader {
                    compressed: true,
                    algorithm: Algorithm::Lz4,
                    payload_wire_size: compressed.len() as u32,
                    message_type,
                };
                Some(frame(header, &compressed))
            } else {
                None
            }
        } else {
            None
        };

        Ok(Self {
            message_type,
            buffer,
            buffer_compressed,
        })
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Returns true if a compressed frame was kept.
    pub fn has_compressed(&self) -> bool {
        self.buffer_compressed.is_some()
    }

    /// The frame to send: the compressed one if requested and available.
    pub fn buffer(&self, prefer_compressed: bool) -> &[u8] {
        match (&self.buffer_compressed, prefer_compressed) {
            (Some(compressed), true) => compressed,
            _ => &self.buffer,
        }
    }
}

/// A message received from a peer, payload already decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
    pub header: MessageHeader,
    pub payload: Vec<u8>,
}

/// Codec for encoding and decoding peer envelopes.
///
/// # Usage
///
/// ```rust,ignore
/// use tokio_util::codec::Framed;
/// use ledgerwatch_overlay::MessageCodec;
///
/// let framed = Framed::new(tcp_stream, MessageCodec::new(true));
/// ```
#[derive(Debug, Default)]
pub struct MessageCodec {
    decode_state: DecodeState,
    /// Whether the peer accepts compressed frames.
    send_compressed: bool,
}

#[derive(Debug, Default)]
enum DecodeState {
    /// Waiting for the 6-byte header.
    #[default]
    ReadingHeader,
    /// Have header, waiting for the payload.
    ReadingPayload(MessageHeader),
}

impl MessageCodec {
    pub fn new(send_compressed: bool) -> Self {
        Self {
            decode_state: DecodeState::ReadingHeader,
            send_compressed,
        }
    }
}

impl Decoder for MessageCodec {
    type Item = MessageFrame;
    type Error = OverlayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.decode_state {
                DecodeState::ReadingHeader => {
                    let header = match MessageHeader::parse(src)? {
                        Some(header) => header,
                        None => return Ok(None),
                    };
                    src.advance(HEADER_SIZE);
                    src.reserve(header.payload_wire_size as usize);
                    self.decode_state = DecodeState::ReadingPayload(header);
                }
                DecodeState::ReadingPayload(header) => {
                    let len = header.payload_wire_size as usize;
                    if src.len() < len {
                        return Ok(None);
                    }
                    let body = src.split_to(len);
                    self.decode_state = DecodeState::ReadingHeader;

                    let payload = if header.compressed {
                        compression::decompress(&body, MAX_PAYLOAD_SIZE)?
                    } else {
                        body.to_vec()
                    };
                    trace!(
                        message_type = %header.message_type,
                        compressed = header.compressed,
                        wire = len,
                        size = payload.len(),
                        "Decoded message"
                    );
                    return Ok(Some(MessageFrame { header, payload }));
                }
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = OverlayError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(message.buffer(self.send_compressed));
        Ok(())
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = OverlayError;

    fn encode(&mut self, message: &Message, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(message.buffer(self.send_compressed));
        Ok(())
    }
}
