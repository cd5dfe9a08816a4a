//! The batching state machine.
//!
//! [`BatchCoordinator`] owns the request queue and the single outstanding
//! [`SentBatch`]. It performs no I/O and never blocks: the driver task feeds
//! it enqueue/cancel commands and scheduler ticks, sends the coordinate list
//! returned by [`BatchCoordinator::tick`] to the query service, and hands the
//! response back through [`BatchCoordinator::complete`].
//!
//! ```text
//! Idle --(tick, live requests queued)--> Downloading --(complete)--> Idle
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use super::request::{CallerId, CoordinateRequest, DeliveryReport, SentBatch};
use super::stats::StatsCounters;
use crate::coord::Coordinate;
use crate::error::{Result, TerrainError};

/// Whether a batch is currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No service call in flight.
    Idle,
    /// Exactly one service call in flight.
    Downloading,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Idle => write!(f, "idle"),
            CoordinatorState::Downloading => write!(f, "downloading"),
        }
    }
}

/// Accumulates point requests and turns them into one service call per window.
pub struct BatchCoordinator {
    queue: VecDeque<CoordinateRequest>,
    sent: Option<SentBatch>,
    stats: Arc<StatsCounters>,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchCoordinator {
    /// Create an idle coordinator with an empty queue.
    pub fn new() -> Self {
        Self::with_stats(Arc::new(StatsCounters::default()))
    }

    pub(crate) fn with_stats(stats: Arc<StatsCounters>) -> Self {
        Self {
            queue: VecDeque::new(),
            sent: None,
            stats,
        }
    }

    /// Current state, derived from whether a batch is outstanding.
    pub fn state(&self) -> CoordinatorState {
        if self.sent.is_some() {
            CoordinatorState::Downloading
        } else {
            CoordinatorState::Idle
        }
    }

    /// Number of requests waiting for the next dispatch window.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// The outstanding batch, if any.
    pub fn sent_batch(&self) -> Option<&SentBatch> {
        self.sent.as_ref()
    }

    /// Append a request to the queue for the next window.
    pub fn enqueue(&mut self, request: CoordinateRequest) {
        tracing::debug!(
            caller = %request.caller(),
            coordinates = request.coordinates().len(),
            state = %self.state(),
            "Queued terrain request"
        );
        self.queue.push_back(request);
        self.stats.record_queued();
    }

    /// Mark every queued or in-flight request of `caller` as dead.
    ///
    /// Queued requests are dropped right away; in-flight slices stay in the
    /// batch so the response can still be sliced, but will not be delivered.
    /// Returns the number of requests affected.
    pub fn cancel(&mut self, caller: CallerId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|request| {
            if request.caller() == caller {
                request.revoke();
                false
            } else {
                true
            }
        });
        let dropped = before - self.queue.len();
        self.stats.record_unqueued(dropped);
        self.stats.record_discarded(dropped);

        let in_flight = self
            .sent
            .as_mut()
            .map_or(0, |batch| batch.revoke_caller(caller));

        if dropped + in_flight > 0 {
            tracing::debug!(
                caller = %caller,
                queued = dropped,
                in_flight = in_flight,
                "Cancelled terrain requests"
            );
        }

        dropped + in_flight
    }

    /// Evaluate one dispatch window.
    ///
    /// No-op while a batch is outstanding or when nothing live is queued.
    /// Otherwise moves the whole queue into a new [`SentBatch`] and returns the
    /// flattened coordinates the caller must send to the query service.
    pub fn tick(&mut self) -> Option<Vec<Coordinate>> {
        if self.sent.is_some() || self.queue.is_empty() {
            return None;
        }

        let queued = self.queue.len();
        let (live, dead): (Vec<_>, Vec<_>) = self.queue.drain(..).partition(|r| r.is_live());
        self.stats.record_unqueued(queued);

        if !dead.is_empty() {
            tracing::debug!(discarded = dead.len(), "Discarded requests of gone callers");
            self.stats.record_discarded(dead.len());
        }

        if live.is_empty() {
            return None;
        }

        let requests = live.len();
        let (batch, coordinates) = SentBatch::flatten(live);

        tracing::info!(
            requests = requests,
            coordinates = coordinates.len(),
            "Dispatching terrain batch"
        );

        self.stats.record_dispatch(coordinates.len());
        self.sent = Some(batch);
        Some(coordinates)
    }

    /// Deliver the service response for the outstanding batch and return to idle.
    ///
    /// Returns `None` if no batch was outstanding.
    pub fn complete(&mut self, result: Result<Vec<f64>>) -> Option<DeliveryReport> {
        let Some(batch) = self.sent.take() else {
            tracing::warn!("Terrain response received while idle, ignoring");
            return None;
        };

        if let Err(ref e) = result {
            tracing::warn!(
                error = %e,
                coordinates = batch.total_coordinates(),
                "Terrain batch failed"
            );
        }

        let report = batch.deliver(result);

        if report.failed {
            self.stats.record_failure();
        }
        self.stats.record_delivered(report.delivered);
        self.stats.record_discarded(report.discarded);

        tracing::debug!(
            delivered = report.delivered,
            discarded = report.discarded,
            failed = report.failed,
            "Terrain batch complete"
        );

        Some(report)
    }

    /// Fail every queued request with [`TerrainError::CoordinatorShutdown`].
    pub(crate) fn shutdown(&mut self) {
        let queued = self.queue.len();
        let mut delivered = 0;
        for request in self.queue.drain(..) {
            if request.resolve(Err(TerrainError::CoordinatorShutdown)) {
                delivered += 1;
            }
        }
        self.stats.record_unqueued(queued);
        self.stats.record_delivered(delivered);
        self.stats.record_discarded(queued - delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::request::{HeightsResult, Liveness};
    use tokio::sync::oneshot;

    struct TestCaller {
        id: CallerId,
        liveness: Liveness,
    }

    impl TestCaller {
        fn new(id: u64) -> Self {
            Self {
                id: CallerId(id),
                liveness: Liveness::new(),
            }
        }

        fn request(&self, n: usize) -> (CoordinateRequest, oneshot::Receiver<HeightsResult>) {
            let (tx, rx) = oneshot::channel();
            let coordinates = (0..n)
                .map(|i| Coordinate::new(self.id.0 as f64, i as f64))
                .collect();
            (
                CoordinateRequest::new(self.id, coordinates, self.liveness.clone(), tx),
                rx,
            )
        }
    }

    fn heights(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_tick_when_idle_and_empty_is_noop() {
        let mut coordinator = BatchCoordinator::new();
        assert_eq!(coordinator.tick(), None);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert!(coordinator.sent_batch().is_none());
    }

    #[test]
    fn test_three_callers_share_one_call() {
        let mut coordinator = BatchCoordinator::new();
        let (a, b, c) = (TestCaller::new(1), TestCaller::new(2), TestCaller::new(3));

        let (req, mut ra) = a.request(2);
        coordinator.enqueue(req);
        let (req, mut rb) = b.request(3);
        coordinator.enqueue(req);
        let (req, mut rc) = c.request(1);
        coordinator.enqueue(req);

        let sent = coordinator.tick().unwrap();
        assert_eq!(sent.len(), 6);
        // Enqueue order preserved in the flattened call
        assert_eq!(sent[0], Coordinate::new(1.0, 0.0));
        assert_eq!(sent[2], Coordinate::new(2.0, 0.0));
        assert_eq!(sent[5], Coordinate::new(3.0, 0.0));
        assert_eq!(coordinator.state(), CoordinatorState::Downloading);

        let batch = coordinator.sent_batch().unwrap();
        let total: usize = batch.slices().iter().map(|s| s.count()).sum();
        assert_eq!(total, sent.len());

        let report = coordinator.complete(Ok(heights(6))).unwrap();
        assert_eq!(report.delivered, 3);

        assert_eq!(ra.try_recv().unwrap(), Ok(vec![0.0, 1.0]));
        assert_eq!(rb.try_recv().unwrap(), Ok(vec![2.0, 3.0, 4.0]));
        assert_eq!(rc.try_recv().unwrap(), Ok(vec![5.0]));
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert!(coordinator.sent_batch().is_none());
    }

    #[test]
    fn test_request_during_download_waits_for_next_window() {
        let mut coordinator = BatchCoordinator::new();
        let (a, d) = (TestCaller::new(1), TestCaller::new(4));

        let (req, mut ra) = a.request(2);
        coordinator.enqueue(req);
        assert_eq!(coordinator.tick().map(|c| c.len()), Some(2));

        let (req, mut rd) = d.request(1);
        coordinator.enqueue(req);

        // At most one batch in flight
        assert_eq!(coordinator.tick(), None);
        assert_eq!(coordinator.queued_len(), 1);

        coordinator.complete(Ok(heights(2)));
        assert!(ra.try_recv().unwrap().is_ok());
        assert!(rd.try_recv().is_err()); // not answered yet

        let sent = coordinator.tick().unwrap();
        assert_eq!(sent, vec![Coordinate::new(4.0, 0.0)]);
        coordinator.complete(Ok(vec![42.0]));
        assert_eq!(rd.try_recv().unwrap(), Ok(vec![42.0]));
    }

    #[test]
    fn test_failed_batch_reports_to_every_live_caller() {
        let mut coordinator = BatchCoordinator::new();
        let callers: Vec<_> = (1..=3).map(TestCaller::new).collect();
        let mut receivers: Vec<_> = callers
            .iter()
            .map(|c| {
                let (req, rx) = c.request(2);
                coordinator.enqueue(req);
                rx
            })
            .collect();

        coordinator.tick().unwrap();
        let error = TerrainError::Transport {
            reason: "HTTP 500".to_string(),
        };
        let report = coordinator.complete(Err(error.clone())).unwrap();
        assert!(report.failed);
        assert_eq!(report.delivered, 3);

        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), Err(error.clone()));
        }

        // Nothing is resent automatically
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.tick(), None);
    }

    #[test]
    fn test_short_response_fails_whole_batch() {
        let mut coordinator = BatchCoordinator::new();
        let a = TestCaller::new(1);
        let (req, mut ra) = a.request(3);
        coordinator.enqueue(req);

        coordinator.tick().unwrap();
        let report = coordinator.complete(Ok(heights(2))).unwrap();

        assert!(report.failed);
        assert!(matches!(
            ra.try_recv().unwrap(),
            Err(TerrainError::ResponseShapeMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_cancel_before_tick_never_dispatches() {
        let mut coordinator = BatchCoordinator::new();
        let (a, b) = (TestCaller::new(1), TestCaller::new(2));

        let (req, mut ra) = a.request(2);
        coordinator.enqueue(req);
        let (req, _rb) = b.request(1);
        coordinator.enqueue(req);

        assert_eq!(coordinator.cancel(a.id), 1);
        assert!(!a.liveness.is_live());

        let sent = coordinator.tick().unwrap();
        assert_eq!(sent, vec![Coordinate::new(2.0, 0.0)]);
        coordinator.complete(Ok(vec![1.0]));

        // Sender was dropped without a value
        assert!(ra.try_recv().is_err());
    }

    #[test]
    fn test_cancel_in_flight_suppresses_delivery() {
        let mut coordinator = BatchCoordinator::new();
        let callers: Vec<_> = (1..=3).map(TestCaller::new).collect();
        let sizes = [2, 3, 1];
        let mut receivers: Vec<_> = callers
            .iter()
            .zip(sizes)
            .map(|(c, n)| {
                let (req, rx) = c.request(n);
                coordinator.enqueue(req);
                rx
            })
            .collect();

        assert_eq!(coordinator.tick().map(|c| c.len()), Some(6));
        assert_eq!(coordinator.cancel(callers[2].id), 1);

        let report = coordinator.complete(Ok(heights(6))).unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.discarded, 1);

        assert_eq!(receivers[0].try_recv().unwrap(), Ok(vec![0.0, 1.0]));
        assert_eq!(receivers[1].try_recv().unwrap(), Ok(vec![2.0, 3.0, 4.0]));
        assert!(receivers[2].try_recv().is_err());
    }

    #[test]
    fn test_revoked_liveness_discarded_at_tick() {
        let mut coordinator = BatchCoordinator::new();
        let a = TestCaller::new(1);
        let (req, _ra) = a.request(2);
        coordinator.enqueue(req);

        // Flag revoked by the caller before the cancel command arrives
        a.liveness.revoke();

        assert_eq!(coordinator.tick(), None);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.queued_len(), 0);
    }

    #[test]
    fn test_complete_while_idle_is_ignored() {
        let mut coordinator = BatchCoordinator::new();
        assert!(coordinator.complete(Ok(vec![1.0])).is_none());
    }

    #[test]
    fn test_same_caller_requests_are_independent() {
        let mut coordinator = BatchCoordinator::new();
        let a = TestCaller::new(1);
        let (first, mut r1) = a.request(1);
        let (second, mut r2) = a.request(2);
        coordinator.enqueue(first);
        coordinator.enqueue(second);

        coordinator.tick().unwrap();
        coordinator.complete(Ok(vec![7.0, 8.0, 9.0]));

        assert_eq!(r1.try_recv().unwrap(), Ok(vec![7.0]));
        assert_eq!(r2.try_recv().unwrap(), Ok(vec![8.0, 9.0]));
    }

    #[test]
    fn test_shutdown_fails_queued_requests() {
        let mut coordinator = BatchCoordinator::new();
        let a = TestCaller::new(1);
        let (req, mut ra) = a.request(1);
        coordinator.enqueue(req);

        coordinator.shutdown();

        assert_eq!(
            ra.try_recv().unwrap(),
            Err(TerrainError::CoordinatorShutdown)
        );
        assert_eq!(coordinator.queued_len(), 0);
    }

    #[test]
    fn test_stats_track_batches() {
        let stats = Arc::new(StatsCounters::default());
        let mut coordinator = BatchCoordinator::with_stats(Arc::clone(&stats));
        let a = TestCaller::new(1);
        let (req, _ra) = a.request(4);
        coordinator.enqueue(req);
        assert_eq!(stats.snapshot().requests_queued, 1);

        coordinator.tick();
        coordinator.complete(Ok(heights(4)));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests_queued, 0);
        assert_eq!(snapshot.batches_dispatched, 1);
        assert_eq!(snapshot.coordinates_sent, 4);
        assert_eq!(snapshot.requests_delivered, 1);
        assert_eq!(snapshot.batches_failed, 0);
    }
}
