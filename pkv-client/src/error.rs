use std::time::Duration;

use bytes::Bytes;
use pkv_common::{DecodeError, EncodeError, Status};
use thiserror::Error;

/// Result type for the pipelined client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced to callers of the pipelined client.
///
/// A key miss is not an error: `get` reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Submitted while the session had no open socket; nothing was queued.
    #[error("not connected to server")]
    NoConnection,
    /// Writing the request failed; the connection was torn down.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
    /// The socket closed or errored while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,
    /// No reply arrived within the caller's timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    /// Response bytes were corrupt; the connection was torn down.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Server answered with an error status.
    #[error("server error ({status}): {}", String::from_utf8_lossy(.message))]
    Server { status: Status, message: Bytes },
    /// Response opcode did not match the command.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// The session actor has stopped.
    #[error("client session has stopped")]
    SessionClosed,
    /// Address could not be split into host and port.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_renders_message() {
        let err = ClientError::Server {
            status: Status::ValueTooLarge,
            message: Bytes::from_static(b"Too large."),
        };
        assert_eq!(err.to_string(), "server error (value too large): Too large.");
    }

    #[test]
    fn codec_errors_convert() {
        let err: ClientError = EncodeError::EmptyKey.into();
        assert!(matches!(err, ClientError::Encode(EncodeError::EmptyKey)));
        let err: ClientError = DecodeError::BadMagic(0).into();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
