//! Batching statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Snapshot of coordinator activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Number of service calls issued for point batches.
    pub batches_dispatched: u64,
    /// Number of those calls that failed (transport or response shape).
    pub batches_failed: u64,
    /// Total coordinates sent across all batches.
    pub coordinates_sent: u64,
    /// Requests whose caller received a result (success or failure).
    pub requests_delivered: u64,
    /// Requests dropped because their caller was cancelled.
    pub requests_discarded: u64,
    /// Requests currently waiting for the next dispatch window.
    pub requests_queued: u64,
}

impl BatchStats {
    /// Average number of coordinates per dispatched batch (0.0 if none yet).
    pub fn coordinates_per_batch(&self) -> f64 {
        if self.batches_dispatched == 0 {
            0.0
        } else {
            self.coordinates_sent as f64 / self.batches_dispatched as f64
        }
    }
}

/// Lock-free counters shared between the coordinator task and its handles.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    batches_dispatched: AtomicU64,
    batches_failed: AtomicU64,
    coordinates_sent: AtomicU64,
    requests_delivered: AtomicU64,
    requests_discarded: AtomicU64,
    requests_queued: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_queued(&self) {
        self.requests_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unqueued(&self, count: usize) {
        self.requests_queued
            .fetch_sub(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, coordinates: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.coordinates_sent
            .fetch_add(coordinates as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, count: usize) {
        self.requests_delivered
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.requests_discarded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BatchStats {
        BatchStats {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            coordinates_sent: self.coordinates_sent.load(Ordering::Relaxed),
            requests_delivered: self.requests_delivered.load(Ordering::Relaxed),
            requests_discarded: self.requests_discarded.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_per_batch() {
        let stats = BatchStats {
            batches_dispatched: 4,
            coordinates_sent: 10,
            ..Default::default()
        };
        assert_eq!(stats.coordinates_per_batch(), 2.5);
        assert_eq!(BatchStats::default().coordinates_per_batch(), 0.0);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        counters.record_queued();
        counters.record_queued();
        counters.record_unqueued(2);
        counters.record_dispatch(6);
        counters.record_delivered(3);
        counters.record_failure();

        let stats = counters.snapshot();
        assert_eq!(stats.requests_queued, 0);
        assert_eq!(stats.batches_dispatched, 1);
        assert_eq!(stats.coordinates_sent, 6);
        assert_eq!(stats.requests_delivered, 3);
        assert_eq!(stats.batches_failed, 1);
    }
}
