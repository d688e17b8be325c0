//! # Pipelined Client API
//!
//! Purpose: Expose a compact async API for issuing memcached binary protocol
//! commands over one persistent, pipelined connection.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides the session actor and codec.
//! 2. **Cheap Handles**: Clones share one session; use as many as you like.
//! 3. **Borrow-Friendly API**: Accept `&[u8]` keys and values.
//! 4. **Misses Are Values**: A missing key is `Ok(None)`, never an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use pkv_common::{Command, Opcode, Response, Status};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::session::{Session, SessionEvent};
use crate::stats::{ClientStats, StatsSnapshot};

/// Handle to a pipelined session.
///
/// Dropping the last handle stops the session and closes its socket.
#[derive(Clone)]
pub struct KVClient {
    mailbox: mpsc::Sender<SessionEvent>,
    connected: watch::Receiver<bool>,
    stats: Arc<ClientStats>,
    default_ttl: u32,
    call_timeout: Duration,
}

impl KVClient {
    /// Creates a client for `addr` (`host:port`) with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(addr: &str) -> ClientResult<Self> {
        let mut config = ClientConfig::default();
        config.set_addr(addr)?;
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    ///
    /// The session starts disconnected and connects in the background; use
    /// `wait_connected` to block until the first connection is up.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        if config.host.is_empty() {
            return Err(ClientError::InvalidAddress(String::new()));
        }
        let stats = Arc::new(ClientStats::new());
        let (mailbox, connected) = Session::spawn(&config, stats.clone());
        Ok(KVClient {
            mailbox,
            connected,
            stats,
            default_ttl: config.default_ttl,
            call_timeout: config.call_timeout(),
        })
    }

    /// Whether the session currently holds an open socket.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Waits until the session holds an open socket.
    pub async fn wait_connected(&self, timeout: Duration) -> ClientResult<()> {
        let mut connected = self.connected.clone();
        let result = match time::timeout(timeout, connected.wait_for(|up| *up)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ClientError::SessionClosed),
            Err(_) => Err(ClientError::Timeout(timeout)),
        };
        result
    }

    /// Fetches a value by key using the default call timeout.
    ///
    /// Returns `Ok(None)` when the key is missing.
    pub async fn get(&self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        self.get_with_timeout(key, self.call_timeout).await
    }

    pub async fn get_with_timeout(&self, key: &[u8], timeout: Duration) -> ClientResult<Option<Bytes>> {
        let response = self
            .execute(Command::get(Bytes::copy_from_slice(key)), timeout)
            .await?;
        expect_opcode(&response, Opcode::Get)?;
        match response.status() {
            Status::NoError => Ok(Some(response.value)),
            Status::KeyNotFound => Ok(None),
            status => Err(server_error(status, response)),
        }
    }

    /// Stores a value with the default TTL and call timeout.
    pub async fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        self.store(key, value, self.default_ttl, self.call_timeout).await
    }

    /// Stores a value that expires after `ttl` (whole seconds).
    pub async fn set_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> ClientResult<()> {
        self.store(key, value, ttl_seconds(ttl), self.call_timeout).await
    }

    pub async fn set_with_timeout(
        &self,
        key: &[u8],
        value: &[u8],
        ttl: Duration,
        timeout: Duration,
    ) -> ClientResult<()> {
        self.store(key, value, ttl_seconds(ttl), timeout).await
    }

    /// Deletes a key. Returns true when a key was removed.
    pub async fn delete(&self, key: &[u8]) -> ClientResult<bool> {
        let response = self
            .execute(Command::delete(Bytes::copy_from_slice(key)), self.call_timeout)
            .await?;
        expect_opcode(&response, Opcode::Delete)?;
        match response.status() {
            Status::NoError => Ok(true),
            Status::KeyNotFound => Ok(false),
            status => Err(server_error(status, response)),
        }
    }

    /// Round-trips an empty command through the pipeline.
    pub async fn noop(&self) -> ClientResult<()> {
        let response = self.execute(Command::Noop, self.call_timeout).await?;
        expect_opcode(&response, Opcode::Noop)?;
        expect_success(response)
    }

    /// Fetches the server version string.
    pub async fn version(&self) -> ClientResult<String> {
        let response = self.execute(Command::Version, self.call_timeout).await?;
        expect_opcode(&response, Opcode::Version)?;
        if !response.status().is_success() {
            return Err(server_error(response.status(), response));
        }
        Ok(String::from_utf8_lossy(&response.value).into_owned())
    }

    /// Sends any command and waits up to `timeout` for its raw response.
    ///
    /// **Logic**:
    /// 1. Post the command with a fresh reply slot to the session mailbox.
    /// 2. Wait on the reply slot; the session answers in wire order.
    /// 3. On timeout, abandon the slot; the request may still reach the server.
    pub async fn execute(&self, command: Command, timeout: Duration) -> ClientResult<Response> {
        let started = Instant::now();
        self.stats.record_request_start();

        let result = match time::timeout(timeout, self.dispatch(command)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(timeout)),
        };

        self.stats.record_request_end(started.elapsed());
        if result.is_err() {
            self.stats.record_error();
        }
        result
    }

    /// Returns a point-in-time view of client statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    async fn store(&self, key: &[u8], value: &[u8], ttl: u32, timeout: Duration) -> ClientResult<()> {
        let command = Command::set(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value), ttl);
        let response = self.execute(command, timeout).await?;
        expect_opcode(&response, Opcode::Set)?;
        expect_success(response)
    }

    async fn dispatch(&self, command: Command) -> ClientResult<Response> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(SessionEvent::Submit { command, reply })
            .await
            .map_err(|_| ClientError::SessionClosed)?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }
}

fn ttl_seconds(ttl: Duration) -> u32 {
    u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX)
}

fn expect_opcode(response: &Response, expected: Opcode) -> ClientResult<()> {
    if response.opcode() == Some(expected) {
        Ok(())
    } else {
        Err(ClientError::UnexpectedResponse)
    }
}

fn expect_success(response: Response) -> ClientResult<()> {
    match response.status() {
        Status::NoError => Ok(()),
        status => Err(server_error(status, response)),
    }
}

fn server_error(status: Status, response: Response) -> ClientError {
    ClientError::Server {
        status,
        message: response.value,
    }
}
