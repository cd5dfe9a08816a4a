//! Time-windowed batching of point-height requests.
//!
//! Many callers ask for heights of small coordinate lists at unpredictable
//! moments. Requests are queued and, on each scheduler tick, every queued
//! request is flattened into one call to the [`QueryService`](crate::QueryService).
//! The response is sliced back per request. At most one call is outstanding;
//! requests arriving meanwhile wait for the next window.
//!
//! [`BatchCoordinator`] is the synchronous state machine and can be driven by
//! hand. [`BatchHandle::spawn`] runs it on a tokio task and hands out
//! [`Caller`]s.

mod coordinator;
mod handle;
mod request;
mod scheduler;
mod stats;
mod task;

pub use coordinator::{BatchCoordinator, CoordinatorState};
pub use handle::{BatchHandle, Caller, PendingHeights};
pub use request::{
    CallerId, CoordinateRequest, DeliveryReport, HeightsResult, Liveness, ReplySender, SentBatch,
    SentSlice,
};
pub use scheduler::{DispatchScheduler, DEFAULT_BATCH_INTERVAL};
pub use stats::BatchStats;
