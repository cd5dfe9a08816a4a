//! Client-side handles to the batching coordinator.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use super::coordinator::BatchCoordinator;
use super::request::{CallerId, CoordinateRequest, HeightsResult, Liveness};
use super::scheduler::DispatchScheduler;
use super::stats::{BatchStats, StatsCounters};
use super::task::{Command, CoordinatorTask};
use crate::coord::{validate_all, Coordinate};
use crate::error::TerrainError;
use crate::query::QueryService;

/// Cloneable handle to a running batch coordinator.
///
/// The coordinator task runs until [`BatchHandle::shutdown`] is called or every
/// handle and [`Caller`] has been dropped.
#[derive(Clone)]
pub struct BatchHandle {
    tx: mpsc::UnboundedSender<Command>,
    next_caller: Arc<AtomicU64>,
    stats: Arc<StatsCounters>,
}

impl BatchHandle {
    /// Spawn a coordinator task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime or with a zero `interval`.
    pub fn spawn(service: Arc<dyn QueryService>, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(StatsCounters::default());

        let task = CoordinatorTask::new(
            BatchCoordinator::with_stats(Arc::clone(&stats)),
            service,
            rx,
            DispatchScheduler::start(interval),
        );
        tokio::spawn(task.run());

        Self {
            tx,
            next_caller: Arc::new(AtomicU64::new(1)),
            stats,
        }
    }

    /// Register a new caller with its own identity and liveness flag.
    pub fn caller(&self) -> Caller {
        let id = CallerId(self.next_caller.fetch_add(1, Ordering::Relaxed));
        Caller {
            id,
            liveness: Liveness::new(),
            tx: self.tx.clone(),
        }
    }

    /// Snapshot of the coordinator's counters.
    pub fn stats(&self) -> BatchStats {
        self.stats.snapshot()
    }

    /// Ask the coordinator to stop.
    ///
    /// The in-flight batch (if any) is still delivered; queued and later
    /// requests fail with [`TerrainError::CoordinatorShutdown`].
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    /// Returns `true` once the coordinator task has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One independently-lifetimed requester.
///
/// Every request made through a caller shares its liveness flag. Cancelling
/// (explicitly or by dropping the caller) guarantees that none of its pending
/// requests will ever yield heights.
pub struct Caller {
    id: CallerId,
    liveness: Liveness,
    tx: mpsc::UnboundedSender<Command>,
}

impl Caller {
    /// This caller's identity.
    pub fn id(&self) -> CallerId {
        self.id
    }

    /// Returns `true` until [`Caller::cancel`] is called.
    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    /// Queue a point-list request for the next dispatch window.
    ///
    /// Never blocks. The returned future resolves once, with one height per
    /// coordinate in input order, or with the batch's error. Empty lists
    /// resolve immediately to an empty result; invalid coordinates resolve
    /// immediately to [`TerrainError::InvalidCoordinate`] without joining a batch.
    pub fn request_heights(&self, coordinates: Vec<Coordinate>) -> PendingHeights {
        if !self.is_live() {
            return PendingHeights::ready(Err(TerrainError::Cancelled));
        }
        if let Err(e) = validate_all(&coordinates) {
            return PendingHeights::ready(Err(e));
        }
        if coordinates.is_empty() {
            return PendingHeights::ready(Ok(Vec::new()));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = CoordinateRequest::new(self.id, coordinates, self.liveness.clone(), reply_tx);

        if self.tx.send(Command::Enqueue(request)).is_err() {
            return PendingHeights::ready(Err(TerrainError::CoordinatorShutdown));
        }

        PendingHeights {
            state: PendingState::Waiting {
                rx: reply_rx,
                liveness: self.liveness.clone(),
            },
        }
    }

    /// Cancel every queued and in-flight request of this caller.
    ///
    /// Idempotent. Pending futures resolve to [`TerrainError::Cancelled`].
    pub fn cancel(&self) {
        if self.liveness.revoke() {
            tracing::debug!(caller = %self.id, "Cancelling caller");
            let _ = self.tx.send(Command::Cancel(self.id));
        }
    }
}

impl Drop for Caller {
    fn drop(&mut self) {
        self.cancel();
    }
}

enum PendingState {
    Ready(std::future::Ready<HeightsResult>),
    Waiting {
        rx: oneshot::Receiver<HeightsResult>,
        liveness: Liveness,
    },
}

/// Future returned by [`Caller::request_heights`].
#[must_use = "futures do nothing unless awaited"]
pub struct PendingHeights {
    state: PendingState,
}

impl PendingHeights {
    fn ready(result: HeightsResult) -> Self {
        Self {
            state: PendingState::Ready(std::future::ready(result)),
        }
    }
}

impl Future for PendingHeights {
    type Output = HeightsResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(ready) => Pin::new(ready).poll(cx),
            // A result racing a cancel is never surfaced
            PendingState::Waiting { liveness, .. } if !liveness.is_live() => {
                Poll::Ready(Err(TerrainError::Cancelled))
            }
            PendingState::Waiting { rx, .. } => match Pin::new(rx).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(TerrainError::CoordinatorShutdown)),
            },
        }
    }
}
