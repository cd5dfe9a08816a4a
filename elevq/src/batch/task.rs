//! Single-task driver for the batching coordinator.
//!
//! All coordinator state lives inside one tokio task. Enqueue and cancel
//! arrive as [`Command`]s over an unbounded channel, the scheduler provides
//! dispatch ticks, and the one outstanding service call is polled in the same
//! `select!` loop, so no state is ever shared or locked.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::coordinator::BatchCoordinator;
use super::request::{CallerId, CoordinateRequest};
use super::scheduler::DispatchScheduler;
use crate::error::Result;
use crate::query::QueryService;

/// Requests sent from handles and callers to the driver task.
pub(crate) enum Command {
    /// Queue a request for the next window.
    Enqueue(CoordinateRequest),
    /// Drop a caller's queued requests and suppress its in-flight results.
    Cancel(CallerId),
    /// Stop accepting work, finish the in-flight batch, then exit.
    Shutdown,
}

type InFlight = BoxFuture<'static, Result<Vec<f64>>>;

pub(crate) struct CoordinatorTask {
    coordinator: BatchCoordinator,
    service: Arc<dyn QueryService>,
    commands: mpsc::UnboundedReceiver<Command>,
    scheduler: DispatchScheduler,
}

impl CoordinatorTask {
    pub(crate) fn new(
        coordinator: BatchCoordinator,
        service: Arc<dyn QueryService>,
        commands: mpsc::UnboundedReceiver<Command>,
        scheduler: DispatchScheduler,
    ) -> Self {
        Self {
            coordinator,
            service,
            commands,
            scheduler,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(
            interval_ms = self.scheduler.period().as_millis() as u64,
            "Terrain batch coordinator started"
        );

        let mut in_flight: Option<InFlight> = None;
        let mut accepting = true;

        loop {
            tokio::select! {
                command = self.commands.recv(), if accepting => match command {
                    Some(Command::Enqueue(request)) => self.coordinator.enqueue(request),
                    Some(Command::Cancel(caller)) => {
                        self.coordinator.cancel(caller);
                    }
                    Some(Command::Shutdown) | None => {
                        accepting = false;
                        self.commands.close();
                    }
                },
                _ = self.scheduler.tick(), if accepting => {
                    if let Some(coordinates) = self.coordinator.tick() {
                        let service = Arc::clone(&self.service);
                        in_flight = Some(Box::pin(async move {
                            service.request_heights(&coordinates).await
                        }));
                    }
                },
                result = wait_in_flight(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.coordinator.complete(result);
                },
                else => break,
            }

            if !accepting && in_flight.is_none() {
                break;
            }
        }

        // Commands that raced the shutdown still hold reply slots
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Enqueue(request) = command {
                self.coordinator.enqueue(request);
            }
        }
        self.coordinator.shutdown();

        tracing::debug!("Terrain batch coordinator stopped");
    }
}

/// Await the outstanding call; only polled while one exists.
async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> Result<Vec<f64>> {
    match in_flight {
        Some(call) => call.await,
        None => std::future::pending().await,
    }
}
