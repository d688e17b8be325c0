//! # PipeKV Client
//!
//! Purpose: Provide an async memcached binary protocol client that pipelines
//! every request over one persistent TCP connection and reconnects on its own.
//!
//! ## Design Principles
//! 1. **Actor Model**: One task owns the socket and all session state.
//! 2. **Strict Ordering**: Responses are matched to callers by send order.
//! 3. **Incremental Reassembly**: Fragmented or batched responses are parsed
//!    as bytes arrive, never by blocking reads.
//! 4. **Loud Failures**: Lost connections fail every pending caller; nothing
//!    is retried behind the caller's back.

mod client;
mod config;
mod connection;
mod error;
mod queue;
mod reassembler;
mod session;
mod stats;

pub use client::KVClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use pkv_common::{Command, Opcode, Response, Status};
pub use stats::{LatencySnapshot, StatsSnapshot};
