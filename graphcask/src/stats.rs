//! Store-wide operational counters: entity counts and an exponentially
//! weighted moving average of read latency, surfaced via `GetStatistics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Smoothing factor for the read-latency EWMA: weight given to the newest
/// sample. Matches the teacher's choice of a fast-adapting average for
/// point-read timing.
const EWMA_ALPHA: f64 = 0.2;

/// Atomic counters plus a single-writer-contended EWMA for read latency.
/// Safe to share behind an `Arc`; every field updates independently so
/// readers never block writers.
#[derive(Debug, Default)]
pub struct StoreStatistics {
    node_count: AtomicU64,
    edge_count: AtomicU64,
    total_queries: AtomicU64,
    /// `f64` bits stored in an `AtomicU64` so the EWMA can update without a
    /// lock; see `record_query_latency`.
    avg_query_nanos_bits: AtomicU64,
}

impl StoreStatistics {
    pub fn new() -> Self {
        StoreStatistics::default()
    }

    pub fn node_count(&self) -> u64 {
        self.node_count.load(Ordering::SeqCst)
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count.load(Ordering::SeqCst)
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries.load(Ordering::SeqCst)
    }

    pub fn average_query_nanos(&self) -> f64 {
        f64::from_bits(self.avg_query_nanos_bits.load(Ordering::SeqCst))
    }

    pub fn incr_node_count(&self) {
        self.node_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Saturates at zero: spec requires counters never underflow on
    /// defensive decrements of already-absent entities.
    pub fn decr_node_count(&self) {
        self.node_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            })
            .ok();
    }

    pub fn incr_edge_count(&self) {
        self.edge_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decr_edge_count(&self) {
        self.edge_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            })
            .ok();
    }

    /// Records one read's elapsed time into the total-query counter and the
    /// running EWMA. Uses a CAS loop since multiple readers can race.
    pub fn record_query_latency(&self, started: Instant) {
        let nanos = started.elapsed().as_nanos() as f64;
        self.total_queries.fetch_add(1, Ordering::SeqCst);
        let mut current_bits = self.avg_query_nanos_bits.load(Ordering::SeqCst);
        loop {
            let current = f64::from_bits(current_bits);
            let updated = if current == 0.0 {
                nanos
            } else {
                EWMA_ALPHA * nanos + (1.0 - EWMA_ALPHA) * current
            };
            match self.avg_query_nanos_bits.compare_exchange_weak(
                current_bits,
                updated.to_bits(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current_bits = actual,
            }
        }
    }

    pub fn set_node_count(&self, value: u64) {
        self.node_count.store(value, Ordering::SeqCst);
    }

    pub fn set_edge_count(&self, value: u64) {
        self.edge_count.store(value, Ordering::SeqCst);
    }
}

/// Snapshot of [`StoreStatistics`] at a point in time, the shape
/// `GetStatistics` returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsSnapshot {
    pub node_count: u64,
    pub edge_count: u64,
    pub total_queries: u64,
    pub average_query_nanos: f64,
}

impl StoreStatistics {
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            total_queries: self.total_queries(),
            average_query_nanos: self.average_query_nanos(),
        }
    }
}
