//! Peer message framing for ledgerwatch.
//!
//! Built and validated ledgers reach a node as peer messages. This crate
//! implements the envelope those messages travel in:
//!
//! - [`MessageHeader`] - the 6-byte header (compression flags, payload
//!   length, message type)
//! - [`Message`] - an outbound message framed both plain and, when
//!   worthwhile, LZ4-compressed
//! - [`MessageCodec`] - `tokio_util` codec for framed byte streams
//! - [`compression`] - the size-prefixed LZ4 payload format
//!
//! # Example
//!
//! ```rust
//! use ledgerwatch_overlay::{Message, MessageHeader, MessageType};
//!
//! let payload = b"validator list ".repeat(20);
//! let msg = Message::new(MessageType::ValidatorList, &payload, true).unwrap();
//!
//! let header = MessageHeader::parse(msg.buffer(true)).unwrap().unwrap();
//! assert!(header.compressed);
//! assert_eq!(header.message_type, MessageType::ValidatorList);
//! ```

mod codec;
pub mod compression;
mod error;
mod message;

pub use codec::{Message, MessageCodec, MessageFrame, MessageHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use compression::Algorithm;
pub use error::OverlayError;
pub use message::MessageType;

/// Result type for overlay operations.
pub type Result<T> = std::result::Result<T, OverlayError>;
