//! FILEMQ wire protocol: frame encoding/decoding.
//!
//! A frame is a complete, in-memory byte buffer. The codec never blocks on
//! I/O and is unaware of sockets; the transport is responsible for
//! delivering whole, reliably-ordered frames.

mod message;
mod primitive;
mod serializer;

pub use message::{decode, encode, Message, MessageId, Op};

use std::fmt;

pub const MAGIC: [u8; 4] = *b"FMQ1";
pub const VERSION: u8 = 1;

/// Maximum length accepted for a long-string or chunk field, to bound
/// allocation from a malformed length prefix.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub enum DecodeError {
    /// Buffer ended before a declared field could be fully read.
    Truncated,
    /// The 4-byte magic did not match.
    BadMagic,
    /// The version byte is not one this codec understands.
    BadVersion(u8),
    /// The message-id byte does not correspond to a known message.
    BadMessageId(u8),
    /// A length prefix (string, map, chunk) exceeded `MAX_FRAME_LEN`.
    FieldTooLarge,
    /// A string field was not valid UTF-8.
    BadUtf8,
    /// The op byte in a CHEEZBURGER frame was neither CREATE nor DELETE.
    BadOp(u8),
    Io(std::io::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "frame truncated"),
            DecodeError::BadMagic => write!(f, "bad magic"),
            DecodeError::BadVersion(v) => write!(f, "unsupported version {v}"),
            DecodeError::BadMessageId(id) => write!(f, "unknown message id {id}"),
            DecodeError::FieldTooLarge => write!(f, "field exceeds maximum length"),
            DecodeError::BadUtf8 => write!(f, "field is not valid utf-8"),
            DecodeError::BadOp(op) => write!(f, "unknown patch op {op}"),
            DecodeError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => DecodeError::Truncated,
            _ => DecodeError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
