// opcode.rs - opcode and status definitions for the memcached binary protocol
//
// Every request frame names its operation with a one-byte opcode, and every
// response frame repeats that opcode and adds a two-byte status.
//
// ============================================================================
// WHICH OPCODES?
// ============================================================================
//
// The pipelined client only needs a handful of operations:
//
// 1. **Get / Set**: the core contract of the client.
// 2. **Delete**: lets callers remove keys without a separate connection.
// 3. **Noop / Version**: cheap liveness probes that still travel through the
//    ordered request queue, useful for checking that a session is healthy.
//
// Quiet variants (GETQ, SETQ, ...) are deliberately absent: a quiet command
// may produce no response at all, which breaks strict one-request /
// one-response ordering that the session relies on for correlation.
//
// ============================================================================
// STATUS CODES
// ============================================================================
//
// Status 0x0001 (key not found) is a protocol-level miss, not a failure, and
// is surfaced to callers separately from transport errors.

/// Opcode byte for GET
pub const OP_GET: u8 = 0x00;

/// Opcode byte for SET
///
/// Carries 8 bytes of extras: flags (u32) followed by expiration (u32).
pub const OP_SET: u8 = 0x01;

/// Opcode byte for DELETE
pub const OP_DELETE: u8 = 0x04;

/// Opcode byte for NOOP
pub const OP_NOOP: u8 = 0x0a;

/// Opcode byte for VERSION
pub const OP_VERSION: u8 = 0x0b;

// ============================================================================
// OPCODE ENUMERATION
// ============================================================================

/// Operations transportable by the client.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Fetch a value by key
    Get = OP_GET,

    /// Store a value with flags and expiration
    Set = OP_SET,

    /// Remove a key
    Delete = OP_DELETE,

    /// Empty round trip
    Noop = OP_NOOP,

    /// Ask the server for its version string
    Version = OP_VERSION,
}

impl Opcode {
    /// Convert opcode to its wire byte
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to create an opcode from its wire byte
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            OP_GET => Some(Self::Get),
            OP_SET => Some(Self::Set),
            OP_DELETE => Some(Self::Delete),
            OP_NOOP => Some(Self::Noop),
            OP_VERSION => Some(Self::Version),
            _ => None,
        }
    }

    /// Get human-readable opcode name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Delete => "DELETE",
            Self::Noop => "NOOP",
            Self::Version => "VERSION",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// STATUS ENUMERATION
// ============================================================================

/// Response status reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    NoError,
    KeyNotFound,
    KeyExists,
    ValueTooLarge,
    InvalidArguments,
    ItemNotStored,
    NonNumeric,
    UnknownCommand,
    OutOfMemory,
    /// Any status this client does not name.
    Other(u16),
}

impl Status {
    /// Decode a wire status
    pub const fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => Self::NoError,
            0x0001 => Self::KeyNotFound,
            0x0002 => Self::KeyExists,
            0x0003 => Self::ValueTooLarge,
            0x0004 => Self::InvalidArguments,
            0x0005 => Self::ItemNotStored,
            0x0006 => Self::NonNumeric,
            0x0081 => Self::UnknownCommand,
            0x0082 => Self::OutOfMemory,
            other => Self::Other(other),
        }
    }

    /// Encode to the wire status
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::NoError => 0x0000,
            Self::KeyNotFound => 0x0001,
            Self::KeyExists => 0x0002,
            Self::ValueTooLarge => 0x0003,
            Self::InvalidArguments => 0x0004,
            Self::ItemNotStored => 0x0005,
            Self::NonNumeric => 0x0006,
            Self::UnknownCommand => 0x0081,
            Self::OutOfMemory => 0x0082,
            Self::Other(code) => code,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "no error"),
            Self::KeyNotFound => write!(f, "key not found"),
            Self::KeyExists => write!(f, "key exists"),
            Self::ValueTooLarge => write!(f, "value too large"),
            Self::InvalidArguments => write!(f, "invalid arguments"),
            Self::ItemNotStored => write!(f, "item not stored"),
            Self::NonNumeric => write!(f, "non-numeric value"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::Other(code) => write!(f, "status 0x{:04x}", code),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
