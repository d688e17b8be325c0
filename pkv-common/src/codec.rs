//! # Incremental Codec
//!
//! Purpose: Encode commands into request frames and parse response frames
//! incrementally as bytes trickle in from a stream socket.
//!
//! ## Design Principles
//! 1. **Pure Functions**: `encode` and `parse_step` own no I/O and no state;
//!    all progress lives in the caller-held `ResponseAccumulator`.
//! 2. **Consume From the Front**: `parse_step` advances the caller's buffer
//!    past the bytes it used, leaving any leftover (the next response) in place.
//! 3. **Resumable**: An incomplete accumulator is handed back on the next call,
//!    so a header split over two TCP segments is not re-parsed.
//! 4. **Fail Fast**: Corrupt framing is reported immediately; the caller
//!    decides whether the stream is still usable.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
use crate::protocol::{
    Command, RequestHeader, Response, ResponseHeader, HEADER_LEN, MAX_BODY_LEN, MAX_KEY_LEN,
    SET_EXTRAS_LEN,
};

/// Progress of parsing one response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseAccumulator {
    /// Fewer than `HEADER_LEN` bytes seen so far.
    #[default]
    AwaitingHeader,
    /// Header consumed; waiting for `total_body_len` bytes.
    AwaitingBody(ResponseHeader),
    /// Response fully parsed.
    Complete(Response),
}

impl ResponseAccumulator {
    pub fn is_complete(&self) -> bool {
        matches!(self, ResponseAccumulator::Complete(_))
    }

    /// Takes the finished response, if parsing completed.
    pub fn into_response(self) -> Option<Response> {
        match self {
            ResponseAccumulator::Complete(response) => Some(response),
            _ => None,
        }
    }
}

/// Encodes `command` as a request frame tagged with `opaque`.
///
/// **Input**: correlation id, command, output buffer.
/// **Output**: frame bytes appended to `out`; `out` is untouched on error.
pub fn encode(opaque: u32, command: &Command, out: &mut BytesMut) -> EncodeResult<()> {
    if let Some(key) = command.key() {
        if key.is_empty() {
            return Err(EncodeError::EmptyKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(EncodeError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
    }

    let (extras_len, value_len) = match command {
        Command::Set { value, .. } => (SET_EXTRAS_LEN, value.len()),
        _ => (0, 0),
    };
    let key_len = command.key().map_or(0, |key| key.len());
    let body_len = extras_len + key_len + value_len;
    if body_len > MAX_BODY_LEN {
        return Err(EncodeError::BodyTooLarge {
            len: body_len,
            max: MAX_BODY_LEN,
        });
    }

    let header = RequestHeader {
        opcode: command.opcode().as_u8(),
        key_len: key_len as u16,
        extras_len: extras_len as u8,
        vbucket: 0,
        total_body_len: body_len as u32,
        opaque,
        cas: 0,
    };
    out.reserve(HEADER_LEN + body_len);
    header.put(out);

    match command {
        Command::Get { key } | Command::Delete { key } => out.extend_from_slice(key),
        Command::Set {
            key,
            value,
            flags,
            expiration,
        } => {
            out.put_u32(*flags);
            out.put_u32(*expiration);
            out.extend_from_slice(key);
            out.extend_from_slice(value);
        }
        Command::Noop | Command::Version => {}
    }
    Ok(())
}

/// Advances parsing of the response expected for `opaque`.
///
/// **Input**: correlation id of the queue head, the receive buffer, and the
/// accumulator from the previous call (or `AwaitingHeader` for a fresh parse).
/// **Output**: the updated accumulator. Consumed bytes are removed from the
/// front of `buf`; anything after the completed frame stays for the next one.
///
/// **Logic**:
/// 1. With a full header available, validate magic, opaque and lengths, then
///    drop the header bytes.
/// 2. With the full body available, split it into extras/key/value.
/// 3. Otherwise return the partial state untouched.
pub fn parse_step(
    opaque: u32,
    buf: &mut BytesMut,
    acc: ResponseAccumulator,
) -> DecodeResult<ResponseAccumulator> {
    let mut state = acc;
    loop {
        state = match state {
            ResponseAccumulator::Complete(response) => {
                return Ok(ResponseAccumulator::Complete(response))
            }
            ResponseAccumulator::AwaitingHeader => {
                if buf.len() < HEADER_LEN {
                    return Ok(ResponseAccumulator::AwaitingHeader);
                }
                let header = decode_header(opaque, buf)?;
                buf.advance(HEADER_LEN);
                ResponseAccumulator::AwaitingBody(header)
            }
            ResponseAccumulator::AwaitingBody(header) => {
                if buf.len() < header.body_len() {
                    return Ok(ResponseAccumulator::AwaitingBody(header));
                }
                let mut body = buf.split_to(header.body_len()).freeze();
                let extras = body.split_to(header.extras_len as usize);
                let key = body.split_to(header.key_len as usize);
                return Ok(ResponseAccumulator::Complete(Response {
                    header,
                    extras,
                    key,
                    value: body,
                }));
            }
        };
    }
}

fn decode_header(opaque: u32, buf: &[u8]) -> DecodeResult<ResponseHeader> {
    let header = ResponseHeader::decode(buf).ok_or(DecodeError::BadMagic(buf[0]))?;
    if header.opaque != opaque {
        return Err(DecodeError::OpaqueMismatch {
            expected: opaque,
            actual: header.opaque,
        });
    }
    let body = header.body_len();
    if body > MAX_BODY_LEN {
        return Err(DecodeError::BodyTooLarge {
            len: body,
            max: MAX_BODY_LEN,
        });
    }
    let extras = header.extras_len as usize;
    let key = header.key_len as usize;
    if extras + key > body {
        return Err(DecodeError::InvalidLengths { extras, key, body });
    }
    Ok(header)
}
