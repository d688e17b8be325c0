//! # Codec Errors
//!
//! Errors reported while turning commands into bytes and bytes into
//! responses. Encoding errors affect a single request; decoding errors mean
//! the byte stream can no longer be framed reliably.

use thiserror::Error;

/// Result alias for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Result alias for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// A command could not be encoded into a request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Keyed commands require a non-empty key.
    #[error("key must not be empty")]
    EmptyKey,
    /// Key exceeds the protocol limit of `MAX_KEY_LEN` bytes.
    #[error("key length {len} exceeds maximum of {max}")]
    KeyTooLong { len: usize, max: usize },
    /// Extras + key + value do not fit the frame's body length.
    #[error("request body of {len} bytes exceeds maximum of {max}")]
    BodyTooLarge { len: usize, max: usize },
}

/// Response bytes could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// First header byte was not the response magic.
    #[error("bad response magic 0x{0:02x}")]
    BadMagic(u8),
    /// The response answers a different request than the queue head.
    #[error("response opaque {actual} does not match request {expected}")]
    OpaqueMismatch { expected: u32, actual: u32 },
    /// Advertised body length is larger than the client accepts.
    #[error("response body of {len} bytes exceeds maximum of {max}")]
    BodyTooLarge { len: usize, max: usize },
    /// Extras and key lengths do not fit within the body length.
    #[error("extras ({extras}) + key ({key}) exceed body length {body}")]
    InvalidLengths { extras: usize, key: usize, body: usize },
}
