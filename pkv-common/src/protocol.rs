//! # Protocol Structures
//!
//! Purpose: Define the memcached binary protocol frames exchanged between the
//! pipelined client and a cache server.
//!
//! ## Design Principles
//!
//! 1. **Fixed Header**: Every frame starts with a 24-byte header so a reader
//!    always knows how many bytes to wait for before it can decide anything.
//! 2. **Length-Prefixed Body**: `total_body_len` frames the body; the stream
//!    itself carries no delimiters.
//! 3. **Opaque Correlation**: The `opaque` field echoes the client's
//!    correlation id so each response can be checked against the request at
//!    the head of the pipeline.
//! 4. **Zero-Copy Bodies**: Decoded key/value/extras are `Bytes` slices of the
//!    receive buffer rather than fresh allocations.
//!
//! ## Usage Notes
//!
//! - All integers are big-endian (network order).
//! - `data_type` and `vbucket` are always zero for this client.
//! - The response header reuses the request's `vbucket` slot as `status`.
//!
//! ## Memory Layout Example
//!
//! ```text
//! RequestHeader (24 bytes total):
//! +----------+-----------+------------+------------+-------------+------------+
//! | magic:1B | opcode:1B | key_len:2B | extras:1B  | data_type:1B| vbucket:2B |
//! +----------+-----------+------------+------------+-------------+------------+
//! | total_body_len:4B                 | opaque:4B                            |
//! +-----------------------------------+--------------------------------------+
//! | cas:8B                                                                   |
//! +--------------------------------------------------------------------------+
//!
//! ResponseHeader (24 bytes total):
//! +----------+-----------+------------+------------+-------------+------------+
//! | magic:1B | opcode:1B | key_len:2B | extras:1B  | data_type:1B| status:2B  |
//! +----------+-----------+------------+------------+-------------+------------+
//! | total_body_len:4B                 | opaque:4B                            |
//! +-----------------------------------+--------------------------------------+
//! | cas:8B                                                                   |
//! +--------------------------------------------------------------------------+
//!
//! Body (total_body_len bytes):
//! +-----------------+--------------+-----------------------------------------+
//! | extras:extras B | key:key_len B| value: total - extras - key_len B       |
//! +-----------------+--------------+-----------------------------------------+
//!
//! SET extras (8 bytes):
//! +-----------+----------------+
//! | flags:4B  | expiration:4B  |
//! +-----------+----------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::opcode::{Opcode, Status};

/// Magic byte opening every request frame.
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte opening every response frame.
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Size of both request and response headers.
pub const HEADER_LEN: usize = 24;

/// Longest key accepted by memcached servers.
pub const MAX_KEY_LEN: usize = 250;

/// Largest body this client will send or accept (64 MiB).
pub const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

/// Size of the SET extras block.
pub const SET_EXTRAS_LEN: usize = 8;

/// Header prepended to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHeader {
    pub opcode: u8,
    pub key_len: u16,
    pub extras_len: u8,
    pub vbucket: u16,
    pub total_body_len: u32,
    /// Correlation id echoed back by the server.
    pub opaque: u32,
    pub cas: u64,
}

impl RequestHeader {
    /// Appends the 24 header bytes to `out`.
    pub fn put(&self, out: &mut BytesMut) {
        out.reserve(HEADER_LEN);
        out.put_u8(REQUEST_MAGIC);
        out.put_u8(self.opcode);
        out.put_u16(self.key_len);
        out.put_u8(self.extras_len);
        out.put_u8(0);
        out.put_u16(self.vbucket);
        out.put_u32(self.total_body_len);
        out.put_u32(self.opaque);
        out.put_u64(self.cas);
    }

    /// Reads a request header from the first `HEADER_LEN` bytes of `buf`.
    ///
    /// Returns `None` if fewer bytes are available or the magic is wrong.
    /// Used by servers and test doubles; the client never parses requests.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN || buf[0] != REQUEST_MAGIC {
            return None;
        }
        let mut cursor = &buf[1..HEADER_LEN];
        let opcode = cursor.get_u8();
        let key_len = cursor.get_u16();
        let extras_len = cursor.get_u8();
        let _data_type = cursor.get_u8();
        let vbucket = cursor.get_u16();
        Some(RequestHeader {
            opcode,
            key_len,
            extras_len,
            vbucket,
            total_body_len: cursor.get_u32(),
            opaque: cursor.get_u32(),
            cas: cursor.get_u64(),
        })
    }
}

/// Header prepended to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseHeader {
    pub opcode: u8,
    pub key_len: u16,
    pub extras_len: u8,
    pub status: Status,
    pub total_body_len: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl ResponseHeader {
    /// Reads a response header from the first `HEADER_LEN` bytes of `buf`.
    ///
    /// **Input**: at least `HEADER_LEN` bytes (caller guarantees).
    /// **Output**: the header, or `None` when the magic byte is wrong.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN || buf[0] != RESPONSE_MAGIC {
            return None;
        }
        let mut cursor = &buf[1..HEADER_LEN];
        let opcode = cursor.get_u8();
        let key_len = cursor.get_u16();
        let extras_len = cursor.get_u8();
        let _data_type = cursor.get_u8();
        let status = Status::from_u16(cursor.get_u16());
        Some(ResponseHeader {
            opcode,
            key_len,
            extras_len,
            status,
            total_body_len: cursor.get_u32(),
            opaque: cursor.get_u32(),
            cas: cursor.get_u64(),
        })
    }

    /// Appends the 24 header bytes to `out`.
    pub fn put(&self, out: &mut BytesMut) {
        out.reserve(HEADER_LEN);
        out.put_u8(RESPONSE_MAGIC);
        out.put_u8(self.opcode);
        out.put_u16(self.key_len);
        out.put_u8(self.extras_len);
        out.put_u8(0);
        out.put_u16(self.status.as_u16());
        out.put_u32(self.total_body_len);
        out.put_u32(self.opaque);
        out.put_u64(self.cas);
    }

    /// Body length as `usize`.
    pub fn body_len(&self) -> usize {
        self.total_body_len as usize
    }
}

/// A command the client can put on the wire.
///
/// Keys and values are `Bytes` so a command can be moved into the session
/// actor without copying payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        key: Bytes,
    },
    Set {
        key: Bytes,
        value: Bytes,
        flags: u32,
        /// Expiration in seconds; 0 means never expire.
        expiration: u32,
    },
    Delete {
        key: Bytes,
    },
    Noop,
    Version,
}

impl Command {
    pub fn get(key: Bytes) -> Self {
        Command::Get { key }
    }

    pub fn set(key: Bytes, value: Bytes, expiration: u32) -> Self {
        Command::Set {
            key,
            value,
            flags: 0,
            expiration,
        }
    }

    pub fn delete(key: Bytes) -> Self {
        Command::Delete { key }
    }

    /// Opcode the command is sent with.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Get { .. } => Opcode::Get,
            Command::Set { .. } => Opcode::Set,
            Command::Delete { .. } => Opcode::Delete,
            Command::Noop => Opcode::Noop,
            Command::Version => Opcode::Version,
        }
    }

    /// Key carried by the command, if any.
    pub fn key(&self) -> Option<&Bytes> {
        match self {
            Command::Get { key } | Command::Set { key, .. } | Command::Delete { key } => Some(key),
            Command::Noop | Command::Version => None,
        }
    }
}

/// A fully decoded response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub header: ResponseHeader,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl Response {
    pub fn status(&self) -> Status {
        self.header.status
    }

    /// Opcode of the response, or `None` for an opcode this client does not know.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_u8(self.header.opcode)
    }

    /// Correlation id echoed by the server.
    pub fn opaque(&self) -> u32 {
        self.header.opaque
    }

    /// Builds a response frame, deriving the header lengths from the parts.
    pub fn new(opcode: Opcode, status: Status, opaque: u32, extras: Bytes, key: Bytes, value: Bytes) -> Self {
        let total = extras.len() + key.len() + value.len();
        Response {
            header: ResponseHeader {
                opcode: opcode.as_u8(),
                key_len: key.len() as u16,
                extras_len: extras.len() as u8,
                status,
                total_body_len: total as u32,
                opaque,
                cas: 0,
            },
            extras,
            key,
            value,
        }
    }

    /// Serializes header and body into `out`.
    pub fn put(&self, out: &mut BytesMut) {
        self.header.put(out);
        out.extend_from_slice(&self.extras);
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader {
            opcode: Opcode::Get.as_u8(),
            key_len: 3,
            extras_len: 0,
            vbucket: 0,
            total_body_len: 3,
            opaque: 0x0102_0304,
            cas: 0,
        };
        let mut buf = BytesMut::new();
        header.put(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(buf[0], REQUEST_MAGIC);
        assert_eq!(&buf[2..4], &[0, 3]);
        assert_eq!(&buf[12..16], &[1, 2, 3, 4]);
        assert_eq!(RequestHeader::decode(&buf), Some(header));
    }

    #[test]
    fn test_response_header_decode() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = RESPONSE_MAGIC;
        buf[1] = Opcode::Get.as_u8();
        buf[7] = 0x01;
        buf[11] = 9;
        buf[15] = 7;
        let header = ResponseHeader::decode(&buf).unwrap();
        assert_eq!(header.status, Status::KeyNotFound);
        assert_eq!(header.body_len(), 9);
        assert_eq!(header.opaque, 7);
    }

    #[test]
    fn test_response_header_rejects_request_magic() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = REQUEST_MAGIC;
        assert_eq!(ResponseHeader::decode(&buf), None);
        assert_eq!(ResponseHeader::decode(&buf[..10]), None);
    }

    #[test]
    fn test_response_new_derives_lengths() {
        let response = Response::new(
            Opcode::Get,
            Status::NoError,
            5,
            Bytes::from_static(&[0, 0, 0, 0]),
            Bytes::new(),
            Bytes::from_static(b"value"),
        );
        assert_eq!(response.header.extras_len, 4);
        assert_eq!(response.header.total_body_len, 9);
        let mut buf = BytesMut::new();
        response.put(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN + 9);
    }

    #[test]
    fn test_command_accessors() {
        let cmd = Command::set(Bytes::from_static(b"a"), Bytes::from_static(b"1"), 60);
        assert_eq!(cmd.opcode(), Opcode::Set);
        assert_eq!(cmd.key(), Some(&Bytes::from_static(b"a")));
        assert_eq!(Command::Noop.key(), None);
    }
}
