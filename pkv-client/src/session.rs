//! # Session Actor
//!
//! Purpose: Serialize every state change of a pipelined connection through
//! one task and one ordered mailbox.
//!
//! ## Design Principles
//! 1. **Single Owner**: Socket, pending queue, receive buffer and request
//!    counter belong to the actor; nothing else reads or writes them.
//! 2. **Deferred Replies**: A caller's reply slot is a `oneshot::Sender`
//!    parked in the pending queue until its response is assembled.
//! 3. **Teardown Is Atomic**: Losing the socket fails every pending caller in
//!    the same handler, so "disconnected" always means "nothing pending".
//! 4. **No Retries**: Failed requests are reported, never resubmitted.
//!
//! ## Structure Overview
//!
//! ```text
//! KVClient ──Submit──┐
//! reader task ──Received/Closed──┤
//! connect task ──ConnectFinished─┼──> mailbox ──> Session::handle
//! reconnect timer ──ReconnectTick┘                 ├── ConnectionManager (socket)
//!                                                  ├── PendingQueue (send order)
//!                                                  └── Reassembler (recv buffer + in-flight)
//! ```

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use pkv_common::{encode, Command, Response};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::error::{ClientError, ClientResult};
use crate::queue::PendingQueue;
use crate::reassembler::{Corrupt, Reassembler};
use crate::stats::ClientStats;

/// Where the actor delivers a caller's result.
pub(crate) type Reply = oneshot::Sender<ClientResult<Response>>;

/// Messages handled by the session actor, one at a time.
pub(crate) enum SessionEvent {
    /// A caller wants `command` sent.
    Submit { command: Command, reply: Reply },
    /// A connect attempt finished.
    ConnectFinished(io::Result<TcpStream>),
    /// Bytes read from socket `generation`.
    Received { generation: u64, data: Bytes },
    /// Socket `generation` reached EOF (`None`) or failed.
    Closed {
        generation: u64,
        error: Option<io::Error>,
    },
    /// Time to try connecting again.
    ReconnectTick,
}

pub(crate) struct Session {
    conn: ConnectionManager,
    pending: PendingQueue<Reply>,
    reassembler: Reassembler<Reply>,
    request_counter: u32,
    encode_buf: BytesMut,
    stats: Arc<ClientStats>,
    connected: watch::Sender<bool>,
}

impl Session {
    /// Starts the actor on the current tokio runtime.
    ///
    /// **Output**: the mailbox sender (the only strong handle) and a watch
    /// receiver tracking whether a socket is open.
    pub fn spawn(
        config: &ClientConfig,
        stats: Arc<ClientStats>,
    ) -> (mpsc::Sender<SessionEvent>, watch::Receiver<bool>) {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let (connected_tx, connected_rx) = watch::channel(false);
        let session = Session::new(config, mailbox_tx.downgrade(), stats, connected_tx);
        tokio::spawn(session.run(mailbox_rx));
        (mailbox_tx, connected_rx)
    }

    fn new(
        config: &ClientConfig,
        events: mpsc::WeakSender<SessionEvent>,
        stats: Arc<ClientStats>,
        connected: watch::Sender<bool>,
    ) -> Self {
        Session {
            conn: ConnectionManager::new(config, events),
            pending: PendingQueue::new(),
            reassembler: Reassembler::new(),
            request_counter: 0,
            encode_buf: BytesMut::with_capacity(256),
            stats,
            connected,
        }
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<SessionEvent>) {
        info!(endpoint = %self.conn.endpoint(), "session started");
        self.conn.start_connect();

        while let Some(event) = mailbox.recv().await {
            self.handle(event).await;
        }

        // Every client handle is gone.
        self.conn.close();
        self.connected.send_replace(false);
        let failed = self.fail_pending();
        info!(endpoint = %self.conn.endpoint(), failed, "session stopped");
    }

    async fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Submit { command, reply } => self.submit(command, reply).await,
            SessionEvent::ConnectFinished(result) => self.on_connect_finished(result),
            SessionEvent::Received { generation, data } => {
                if self.conn.owns(generation) {
                    self.on_bytes_received(&data);
                } else {
                    debug!(generation, bytes = data.len(), "ignoring bytes from stale socket");
                }
            }
            SessionEvent::Closed { generation, error } => {
                if self.conn.owns(generation) {
                    match &error {
                        Some(error) => warn!(endpoint = %self.conn.endpoint(), %error, "socket read failed"),
                        None => warn!(endpoint = %self.conn.endpoint(), "socket closed by peer"),
                    }
                    self.on_connection_lost();
                } else {
                    debug!(generation, "ignoring close of stale socket");
                }
            }
            SessionEvent::ReconnectTick => self.on_reconnect_tick(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.request_counter;
        self.request_counter = self.request_counter.wrapping_add(1);
        id
    }

    /// Encodes and writes `command`, parking `reply` until its response arrives.
    async fn submit(&mut self, command: Command, reply: Reply) {
        if !self.conn.is_connected() {
            let _ = reply.send(Err(ClientError::NoConnection));
            return;
        }
        if reply.is_closed() {
            debug!(op = %command.opcode(), "caller gave up before send; dropping request");
            return;
        }

        let id = self.next_id();
        self.encode_buf.clear();
        if let Err(err) = encode(id, &command, &mut self.encode_buf) {
            let _ = reply.send(Err(err.into()));
            return;
        }

        match self.conn.write(&self.encode_buf).await {
            Ok(()) => {
                self.pending.push_back(id, reply);
                debug!(id, op = %command.opcode(), pending = self.pending.len(), "request sent");
            }
            Err(error) => {
                warn!(endpoint = %self.conn.endpoint(), id, %error, "write failed");
                self.on_connection_lost();
                let _ = reply.send(Err(ClientError::WriteFailed(error)));
            }
        }
    }

    /// Routes inbound bytes through the reassembler to waiting callers.
    fn on_bytes_received(&mut self, data: &[u8]) {
        let result = self.reassembler.feed(data, &mut self.pending, |id, reply, response| {
            debug!(id, status = %response.status(), "response received");
            // The caller may have timed out; a dead reply slot is fine.
            let _ = reply.send(Ok(response));
        });

        if let Err(Corrupt { id, caller, error }) = result {
            warn!(endpoint = %self.conn.endpoint(), id, %error, "undecodable response; dropping connection");
            let _ = caller.send(Err(ClientError::Decode(error)));
            self.on_connection_lost();
        }
    }

    /// Tears the connection down, fails everyone waiting, and schedules a reconnect.
    fn on_connection_lost(&mut self) {
        if self.conn.close() {
            self.stats.record_connection_loss();
        }
        self.connected.send_replace(false);
        let discarded = self.reassembler.buffered();
        let failed = self.fail_pending();
        if failed > 0 || discarded > 0 {
            info!(failed, discarded, "failed pending requests after connection loss");
        }
        self.conn.schedule_reconnect();
    }

    /// Replies `ConnectionClosed` to the in-flight caller, then the queue in order.
    fn fail_pending(&mut self) -> usize {
        let mut failed = 0;
        if let Some(reply) = self.reassembler.reset() {
            let _ = reply.send(Err(ClientError::ConnectionClosed));
            failed += 1;
        }
        failed += self.pending.drain_with(|entry| {
            let _ = entry.caller.send(Err(ClientError::ConnectionClosed));
        });
        failed
    }

    fn on_reconnect_tick(&mut self) {
        if self.conn.is_connected() {
            debug!("reconnect tick while connected");
            return;
        }
        self.conn.start_connect();
    }

    fn on_connect_finished(&mut self, result: io::Result<TcpStream>) {
        let stream = match result {
            Ok(stream) => stream,
            Err(error) => {
                self.conn.connect_failed();
                self.stats.record_connect_failure();
                warn!(endpoint = %self.conn.endpoint(), %error, "connect failed; will retry");
                self.conn.schedule_reconnect();
                return;
            }
        };

        if self.conn.is_connected() {
            warn!("unexpected second connection; dropping it");
            return;
        }

        match self.conn.attach(stream) {
            Ok(generation) => {
                self.stats.record_connect();
                self.connected.send_replace(true);
                info!(endpoint = %self.conn.endpoint(), generation, "connected");
            }
            Err(error) => {
                self.conn.connect_failed();
                self.stats.record_connect_failure();
                warn!(endpoint = %self.conn.endpoint(), %error, "socket setup failed; will retry");
                self.conn.schedule_reconnect();
            }
        }
    }
}
