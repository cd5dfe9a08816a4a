//! Bookkeeping records for queued and in-flight point requests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::coord::Coordinate;
use crate::error::{Result, TerrainError};

/// Outcome delivered to a caller for one point request.
pub type HeightsResult = Result<Vec<f64>>;

/// One-shot delivery slot for a single request's result.
pub type ReplySender = oneshot::Sender<HeightsResult>;

/// Opaque identity of a caller, used only for routing and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerId(pub(crate) u64);

impl CallerId {
    /// Wrap a raw identifier. Handles allocate these automatically.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller-{}", self.0)
    }
}

/// Caller-owned flag telling the coordinator whether results may still be delivered.
///
/// The caller side revokes it; the coordinator only ever reads it. Clones share
/// the same flag.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    /// Create a new, live flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns `true` until the flag is revoked.
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Revoke the flag. Returns `true` if it was live before this call.
    pub fn revoke(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-list request waiting in the queue for the next dispatch window.
pub struct CoordinateRequest {
    caller: CallerId,
    coordinates: Vec<Coordinate>,
    liveness: Liveness,
    reply: ReplySender,
}

impl CoordinateRequest {
    /// Bundle a coordinate list with its caller, liveness flag and reply slot.
    pub fn new(
        caller: CallerId,
        coordinates: Vec<Coordinate>,
        liveness: Liveness,
        reply: ReplySender,
    ) -> Self {
        Self {
            caller,
            coordinates,
            liveness,
            reply,
        }
    }

    /// The caller that owns this request.
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// The requested coordinates, in caller order.
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// A request is live while its caller has not cancelled and still listens.
    pub fn is_live(&self) -> bool {
        self.liveness.is_live() && !self.reply.is_closed()
    }

    pub(crate) fn revoke(&self) {
        self.liveness.revoke();
    }

    /// Resolve the request without dispatching it.
    pub(crate) fn resolve(self, result: HeightsResult) -> bool {
        self.is_live() && self.reply.send(result).is_ok()
    }
}

/// One request's share of a dispatched batch.
pub struct SentSlice {
    caller: CallerId,
    count: usize,
    liveness: Liveness,
    reply: Option<ReplySender>,
}

impl SentSlice {
    /// The caller that owns this slice.
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// Number of coordinates this slice contributed to the batch.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether this slice will be delivered when the batch completes.
    pub fn is_live(&self) -> bool {
        self.liveness.is_live() && self.reply.as_ref().is_some_and(|r| !r.is_closed())
    }

    /// Mark the slice dead and release its delivery slot immediately.
    pub(crate) fn revoke(&mut self) {
        self.liveness.revoke();
        self.reply = None;
    }

    /// Deliver to the caller if it is still live. Returns `true` on delivery.
    fn deliver(self, result: HeightsResult) -> bool {
        if !self.liveness.is_live() {
            return false;
        }
        match self.reply {
            Some(reply) => reply.send(result).is_ok(),
            None => false,
        }
    }
}

/// Counts from delivering one completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Slices whose caller received a result.
    pub delivered: usize,
    /// Slices dropped because their caller was gone.
    pub discarded: usize,
    /// Whether the batch as a whole failed.
    pub failed: bool,
}

/// The set of requests bundled into the one outstanding service call.
///
/// Invariant: the sum of slice counts equals the length of the flattened
/// coordinate list that was sent, and therefore the expected response length.
pub struct SentBatch {
    slices: Vec<SentSlice>,
    total: usize,
}

impl SentBatch {
    /// Flatten requests into one ordered coordinate list, recording slice boundaries.
    pub(crate) fn flatten(requests: Vec<CoordinateRequest>) -> (Self, Vec<Coordinate>) {
        let total = requests.iter().map(|r| r.coordinates.len()).sum();
        let mut coordinates = Vec::with_capacity(total);
        let mut slices = Vec::with_capacity(requests.len());

        for request in requests {
            slices.push(SentSlice {
                caller: request.caller,
                count: request.coordinates.len(),
                liveness: request.liveness,
                reply: Some(request.reply),
            });
            coordinates.extend(request.coordinates);
        }

        (Self { slices, total }, coordinates)
    }

    /// Per-request slices, in the order their coordinates were flattened.
    pub fn slices(&self) -> &[SentSlice] {
        &self.slices
    }

    /// Total number of coordinates sent for this batch.
    pub fn total_coordinates(&self) -> usize {
        self.total
    }

    /// Revoke every slice owned by `caller`. Returns how many were affected.
    pub(crate) fn revoke_caller(&mut self, caller: CallerId) -> usize {
        let mut revoked = 0;
        for slice in self.slices.iter_mut().filter(|s| s.caller == caller) {
            slice.revoke();
            revoked += 1;
        }
        revoked
    }

    /// Split the service response back to each caller.
    ///
    /// A success whose length disagrees with [`Self::total_coordinates`] is
    /// treated as a whole-batch failure. Dead callers are skipped silently.
    pub(crate) fn deliver(self, result: Result<Vec<f64>>) -> DeliveryReport {
        let result = match result {
            Ok(heights) if heights.len() != self.total => {
                Err(TerrainError::ResponseShapeMismatch {
                    expected: self.total,
                    actual: heights.len(),
                })
            }
            other => other,
        };

        let mut report = DeliveryReport {
            failed: result.is_err(),
            ..Default::default()
        };

        match result {
            Ok(heights) => {
                let mut rest = heights.into_iter();
                for slice in self.slices {
                    let part: Vec<f64> = rest.by_ref().take(slice.count).collect();
                    if slice.deliver(Ok(part)) {
                        report.delivered += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
            }
            Err(e) => {
                for slice in self.slices {
                    if slice.deliver(Err(e.clone())) {
                        report.delivered += 1;
                    } else {
                        report.discarded += 1;
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        id: u64,
        coords: &[(f64, f64)],
    ) -> (CoordinateRequest, oneshot::Receiver<HeightsResult>) {
        let (tx, rx) = oneshot::channel();
        let coordinates = coords.iter().map(|&c| Coordinate::from(c)).collect();
        (
            CoordinateRequest::new(CallerId(id), coordinates, Liveness::new(), tx),
            rx,
        )
    }

    #[test]
    fn test_liveness_revoke() {
        let live = Liveness::new();
        let shared = live.clone();
        assert!(shared.is_live());
        assert!(live.revoke());
        assert!(!shared.is_live());
        // Second revoke reports it was already dead
        assert!(!shared.revoke());
    }

    #[test]
    fn test_flatten_records_boundaries() {
        let (a, _ra) = request(1, &[(1.0, 1.0), (2.0, 2.0)]);
        let (b, _rb) = request(2, &[(3.0, 3.0)]);

        let (batch, coords) = SentBatch::flatten(vec![a, b]);

        assert_eq!(coords.len(), 3);
        assert_eq!(coords[2], Coordinate::new(3.0, 3.0));
        assert_eq!(batch.total_coordinates(), 3);
        let counts: Vec<usize> = batch.slices().iter().map(|s| s.count()).collect();
        assert_eq!(counts, vec![2, 1]);
        assert_eq!(counts.iter().sum::<usize>(), coords.len());
    }

    #[test]
    fn test_deliver_slices_in_order() {
        let (a, mut ra) = request(1, &[(1.0, 1.0), (2.0, 2.0)]);
        let (b, mut rb) = request(2, &[(3.0, 3.0)]);
        let (batch, _) = SentBatch::flatten(vec![a, b]);

        let report = batch.deliver(Ok(vec![10.0, 20.0, 30.0]));

        assert_eq!(report.delivered, 2);
        assert!(!report.failed);
        assert_eq!(ra.try_recv().unwrap(), Ok(vec![10.0, 20.0]));
        assert_eq!(rb.try_recv().unwrap(), Ok(vec![30.0]));
    }

    #[test]
    fn test_deliver_length_mismatch_fails_batch() {
        let (a, mut ra) = request(1, &[(1.0, 1.0), (2.0, 2.0)]);
        let (batch, _) = SentBatch::flatten(vec![a]);

        let report = batch.deliver(Ok(vec![10.0]));

        assert!(report.failed);
        assert_eq!(
            ra.try_recv().unwrap(),
            Err(TerrainError::ResponseShapeMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_deliver_skips_revoked_slice() {
        let (a, mut ra) = request(1, &[(1.0, 1.0)]);
        let (b, mut rb) = request(2, &[(2.0, 2.0)]);
        let (mut batch, _) = SentBatch::flatten(vec![a, b]);

        assert_eq!(batch.revoke_caller(CallerId(1)), 1);
        assert!(!batch.slices()[0].is_live());

        let report = batch.deliver(Ok(vec![5.0, 6.0]));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.discarded, 1);
        // The revoked slot was released without a value
        assert!(ra.try_recv().is_err());
        assert_eq!(rb.try_recv().unwrap(), Ok(vec![6.0]));
    }

    #[test]
    fn test_dropped_receiver_is_not_live() {
        let (a, ra) = request(1, &[(1.0, 1.0)]);
        assert!(a.is_live());
        drop(ra);
        assert!(!a.is_live());
    }
}
