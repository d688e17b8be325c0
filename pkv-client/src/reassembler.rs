//! # Receive Reassembler
//!
//! Purpose: Turn an unframed byte stream back into one response per pending
//! request, no matter how TCP split or batched the bytes.
//!
//! ## Design Principles
//! 1. **Head-Only Parsing**: Only the oldest pending request is ever being
//!    parsed; responses arrive in send order.
//! 2. **Carry State Forward**: A partial parse is kept with its caller until
//!    the next delivery finishes it.
//! 3. **Iterative Drain**: One delivery can complete many responses; the loop
//!    runs until the buffer is exhausted or a response is incomplete.
//! 4. **Corruption Is Terminal**: A decode error hands the affected caller
//!    back so the session can fail it and drop the connection.

use bytes::BytesMut;
use pkv_common::{parse_step, DecodeError, Response, ResponseAccumulator};
use tracing::{trace, warn};

use crate::queue::PendingQueue;

/// The response currently being parsed for the queue head.
struct InFlight<T> {
    id: u32,
    caller: T,
    acc: ResponseAccumulator,
}

/// Framing failed for the request `id`; the stream is no longer usable.
#[derive(Debug)]
pub(crate) struct Corrupt<T> {
    pub id: u32,
    pub caller: T,
    pub error: DecodeError,
}

/// Receive buffer plus at most one in-flight partial parse.
pub(crate) struct Reassembler<T> {
    buffer: BytesMut,
    in_flight: Option<InFlight<T>>,
}

impl<T> Reassembler<T> {
    pub fn new() -> Self {
        Reassembler {
            buffer: BytesMut::with_capacity(8 * 1024),
            in_flight: None,
        }
    }

    /// Bytes received but not yet consumed by parsing.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[cfg(test)]
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Appends `data` and completes as many queued responses as it can.
    ///
    /// **Input**: newly received bytes, the pending queue, and a callback
    /// receiving `(id, caller, response)` for each completed response.
    /// **Output**: number of responses completed, or the caller whose
    /// response could not be decoded.
    ///
    /// **Logic**:
    /// 1. Resume the in-flight parse, or pop the queue head for a fresh one.
    /// 2. Advance the parse over the buffer.
    /// 3. Complete: hand the response out and continue with leftover bytes.
    /// 4. Incomplete: park the parse and wait for the next delivery.
    pub fn feed<F>(
        &mut self,
        data: &[u8],
        queue: &mut PendingQueue<T>,
        mut complete: F,
    ) -> Result<usize, Corrupt<T>>
    where
        F: FnMut(u32, T, Response),
    {
        self.buffer.extend_from_slice(data);
        let mut completed = 0;

        while !self.buffer.is_empty() {
            let InFlight { id, caller, acc } = match self.in_flight.take() {
                Some(in_flight) => in_flight,
                None => match queue.pop_front() {
                    Some(entry) => InFlight {
                        id: entry.id,
                        caller: entry.caller,
                        acc: ResponseAccumulator::default(),
                    },
                    None => {
                        warn!(bytes = self.buffer.len(), "received bytes with no pending request");
                        break;
                    }
                },
            };

            match parse_step(id, &mut self.buffer, acc) {
                Ok(ResponseAccumulator::Complete(response)) => {
                    trace!(id, "response complete");
                    complete(id, caller, response);
                    completed += 1;
                }
                Ok(acc) => {
                    self.in_flight = Some(InFlight { id, caller, acc });
                    break;
                }
                Err(error) => {
                    self.buffer.clear();
                    return Err(Corrupt { id, caller, error });
                }
            }
        }

        Ok(completed)
    }

    /// Drops buffered bytes and returns the in-flight caller, if any.
    pub fn reset(&mut self) -> Option<T> {
        self.buffer.clear();
        self.in_flight.take().map(|in_flight| in_flight.caller)
    }
}
