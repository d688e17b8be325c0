//! # Client Statistics
//!
//! Provide lightweight counters and a latency histogram describing what the
//! pipelined client has been doing: call volume, failures, connection churn.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Use atomic counters to aggregate events cheaply.
//! 2. **Fixed Buckets**: Keep histogram buckets in a contiguous array for cache locality.
//! 3. **Split Ownership**: Call counters are written by `KVClient` handles,
//!    connection counters only by the session actor.
//!
//! ## Notes
//! - Bucket boundaries are expressed in microseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency bucket boundaries in microseconds.
pub const DEFAULT_LATENCY_BUCKETS_US: [u64; 12] =
    [50, 100, 200, 500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 1_000_000];

/// Snapshot of all client statistics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Calls issued through any `KVClient` handle.
    pub requests_total: u64,
    /// Calls that ended in a `ClientError`.
    pub errors_total: u64,
    /// Calls currently waiting for a reply.
    pub inflight: u64,
    /// Connections established by the session.
    pub connects_total: u64,
    /// Connect attempts that failed.
    pub connect_failures_total: u64,
    /// Established connections that were later lost.
    pub connection_losses_total: u64,
    /// Call latency histogram.
    pub latency: LatencySnapshot,
}

/// Snapshot of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Bucket boundaries in microseconds.
    pub bounds_us: Vec<u64>,
    /// Bucket counts, including the overflow bucket at the end.
    pub buckets: Vec<u64>,
    /// Total number of samples.
    pub samples: u64,
    /// Sum of latencies in microseconds.
    pub sum_us: u64,
}

/// Thread-safe statistics shared by the client handles and the session.
///
/// `Ordering::Relaxed` is sufficient: readers only need eventually consistent
/// counters, never cross-field ordering.
#[derive(Debug)]
pub struct ClientStats {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    connects_total: AtomicU64,
    connect_failures_total: AtomicU64,
    connection_losses_total: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStats {
    /// Creates statistics with the default latency buckets.
    pub fn new() -> Self {
        Self::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_US.to_vec())
    }

    /// Creates statistics with custom latency bucket boundaries.
    ///
    /// **Input**: `bounds_us` (ascending microsecond thresholds).
    pub fn with_latency_buckets(bounds_us: Vec<u64>) -> Self {
        ClientStats {
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            connects_total: AtomicU64::new(0),
            connect_failures_total: AtomicU64::new(0),
            connection_losses_total: AtomicU64::new(0),
            latency: LatencyHistogram::new(bounds_us),
        }
    }

    /// Records a call entering the client.
    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a call leaving the client, successful or not.
    pub fn record_request_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect(&self) {
        self.connects_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_loss(&self) {
        self.connection_losses_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters and histogram buckets.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            connects_total: self.connects_total.load(Ordering::Relaxed),
            connect_failures_total: self.connect_failures_total.load(Ordering::Relaxed),
            connection_losses_total: self.connection_losses_total.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

/// Fixed-bucket latency histogram.
///
/// Uses a linear scan to pick buckets; the list is short and stays hot in cache.
#[derive(Debug)]
pub struct LatencyHistogram {
    bounds_us: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Creates a histogram with `bounds_us.len() + 1` buckets (last is overflow).
    pub fn new(bounds_us: Vec<u64>) -> Self {
        let buckets = (0..=bounds_us.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Records a latency measurement.
    ///
    /// **Logic**:
    /// 1. Convert to microseconds.
    /// 2. Increment `samples` and add to `sum_us`.
    /// 3. Find the first bucket where `micros <= bound`, otherwise use overflow.
    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);

        let idx = self
            .bounds_us
            .iter()
            .position(|&bound| micros <= bound)
            .unwrap_or(self.bounds_us.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_us: self.bounds_us.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}
