//! # Connection Manager
//!
//! Purpose: Own the single TCP socket of a session: open it, write to it,
//! read from it on a background task, and close it.
//!
//! ## Design Principles
//! 1. **Actor-Owned Socket**: Only the session actor touches the write half;
//!    the read half lives on a reader task that posts chunks to the mailbox.
//! 2. **Generations**: Each established socket gets a fresh generation so
//!    late notifications from a replaced socket can be recognized.
//! 3. **Off-Loop Connects**: Connect attempts and reconnect delays run on
//!    spawned tasks; the actor keeps serving its mailbox meanwhile.
//! 4. **Fixed Delay**: Reconnects wait a constant interval, forever.
//! 5. **Weak Mailbox Handles**: Background tasks never keep the session alive.

use std::fmt;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::WeakSender;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::session::SessionEvent;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Target of the session; fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// An established socket.
struct Link {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
    generation: u64,
}

pub(crate) struct ConnectionManager {
    endpoint: Endpoint,
    connect_timeout: Duration,
    write_timeout: Duration,
    reconnect_interval: Duration,
    events: WeakSender<SessionEvent>,
    link: Option<Link>,
    generation: u64,
    connecting: bool,
}

impl ConnectionManager {
    pub fn new(config: &ClientConfig, events: WeakSender<SessionEvent>) -> Self {
        ConnectionManager {
            endpoint: Endpoint {
                host: config.host.clone(),
                port: config.port,
            },
            connect_timeout: config.connect_timeout(),
            write_timeout: config.write_timeout(),
            reconnect_interval: config.reconnect_interval(),
            events,
            link: None,
            generation: 0,
            connecting: false,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// True when `generation` names the socket currently held.
    pub fn owns(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    /// Starts one connect attempt; the outcome arrives as `ConnectFinished`.
    ///
    /// Ignored while connected or while another attempt is running.
    pub fn start_connect(&mut self) {
        if self.link.is_some() || self.connecting {
            debug!(endpoint = %self.endpoint, "connect skipped; socket open or attempt running");
            return;
        }
        self.connecting = true;

        let endpoint = self.endpoint.clone();
        let connect_timeout = self.connect_timeout;
        let events = self.events.clone();
        tokio::spawn(async move {
            let addr = (endpoint.host.as_str(), endpoint.port);
            let result = match time::timeout(connect_timeout, TcpStream::connect(addr)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
            };
            post(&events, SessionEvent::ConnectFinished(result)).await;
        });
    }

    /// Posts `ReconnectTick` after the fixed reconnect interval.
    pub fn schedule_reconnect(&self) {
        let delay = self.reconnect_interval;
        let events = self.events.clone();
        tokio::spawn(async move {
            time::sleep(delay).await;
            post(&events, SessionEvent::ReconnectTick).await;
        });
    }

    /// Marks the running connect attempt as finished without a socket.
    pub fn connect_failed(&mut self) {
        self.connecting = false;
    }

    /// Takes ownership of a freshly connected stream and starts reading it.
    ///
    /// **Output**: the generation assigned to this socket.
    pub fn attach(&mut self, stream: TcpStream) -> io::Result<u64> {
        self.connecting = false;
        // Small requests should not wait for Nagle coalescing.
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        self.generation += 1;
        let generation = self.generation;
        let reader = tokio::spawn(read_loop(reader, generation, self.events.clone()));
        self.link = Some(Link {
            writer,
            reader,
            generation,
        });
        Ok(generation)
    }

    /// Writes one encoded request in full.
    ///
    /// Any failure, including a write that does not finish within the write
    /// timeout, leaves the socket unusable; the caller must `close` it.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no socket"))?;
        match time::timeout(self.write_timeout, link.writer.write_all(bytes)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        }
    }

    /// Drops the socket and stops its reader. Safe to call when disconnected.
    ///
    /// Returns whether a socket was open.
    pub fn close(&mut self) -> bool {
        match self.link.take() {
            Some(link) => {
                link.reader.abort();
                debug!(endpoint = %self.endpoint, generation = link.generation, "socket closed");
                true
            }
            None => false,
        }
    }
}

async fn post(events: &WeakSender<SessionEvent>, event: SessionEvent) -> bool {
    match events.upgrade() {
        Some(sender) => sender.send(event).await.is_ok(),
        None => false,
    }
}

async fn read_loop(mut reader: OwnedReadHalf, generation: u64, events: WeakSender<SessionEvent>) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        // `read_buf` reports 0 for a full buffer too, so always leave room.
        buf.reserve(READ_BUFFER_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                post(&events, SessionEvent::Closed { generation, error: None }).await;
                return;
            }
            Ok(n) => {
                trace!(generation, bytes = n, "socket readable");
                let data = buf.split().freeze();
                if !post(&events, SessionEvent::Received { generation, data }).await {
                    return;
                }
            }
            Err(error) => {
                post(&events, SessionEvent::Closed { generation, error: Some(error) }).await;
                return;
            }
        }
    }
}
