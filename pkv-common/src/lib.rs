// pkv-common - Wire protocol definitions and codec for PipeKV
//
// This crate defines the memcached binary protocol framing used by the
// pipelined client: opcodes, status codes, headers, and the incremental codec.

pub mod codec;
pub mod error;
pub mod opcode;
pub mod protocol;

// Re-export for convenience
pub use codec::*;
pub use error::*;
pub use opcode::*;
pub use protocol::*;
