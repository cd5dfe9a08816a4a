//! Terrain query backends.
//!
//! A [`QueryService`] turns coordinates into terrain heights. The batching
//! coordinator only ever calls [`QueryService::request_heights`]; the path and
//! carpet operations are used directly by the composition helpers.
//!
//! Backends are selected at construction time by handing an
//! `Arc<dyn QueryService>` to the [`TerrainServiceBuilder`](crate::TerrainServiceBuilder).
//! The `airmap` feature provides [`AirMapQuery`], an HTTP implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coord::Coordinate;
use crate::error::Result;

#[cfg(feature = "airmap")]
mod airmap;

#[cfg(feature = "airmap")]
pub use airmap::{AirMapConfig, AirMapQuery, DEFAULT_AIRMAP_URL};

/// Terrain heights sampled along a straight path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathHeights {
    /// Latitudinal distance between consecutive heights, in degrees.
    pub lat_step: f64,
    /// Longitudinal distance between consecutive heights, in degrees.
    pub lon_step: f64,
    /// Terrain heights along the path, in meters, starting at the origin.
    pub heights: Vec<f64>,
}

/// Terrain heights over a rectangular area.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CarpetHeights {
    /// Lowest height in the area, in meters.
    pub min_height: f64,
    /// Highest height in the area, in meters.
    pub max_height: f64,
    /// Height grid, one row per latitude step. Empty for stats-only queries.
    pub carpet: Vec<Vec<f64>>,
}

/// Capability interface for anything that can answer terrain queries.
///
/// Implementations must be safe to share between tasks; every method is
/// asynchronous and reports failures as [`TerrainError`](crate::TerrainError).
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Request terrain heights for a list of coordinates.
    ///
    /// On success the returned list has exactly one height per coordinate, in
    /// the same order. Callers validate this contract defensively.
    async fn request_heights(&self, coordinates: &[Coordinate]) -> Result<Vec<f64>>;

    /// Request terrain heights along the straight path between two coordinates.
    async fn request_path_heights(&self, from: Coordinate, to: Coordinate)
        -> Result<PathHeights>;

    /// Request terrain heights for the area bounded by `sw` and `ne`.
    ///
    /// With `stats_only` set, only the min/max statistics are returned and the
    /// carpet grid is left empty.
    async fn request_carpet_heights(
        &self,
        sw: Coordinate,
        ne: Coordinate,
        stats_only: bool,
    ) -> Result<CarpetHeights>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scriptable in-memory backend shared by the crate's tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::error::TerrainError;

    /// One scripted answer for `request_heights`.
    pub enum Reply {
        /// Answer with `lat + lon` for every coordinate.
        Echo,
        /// Answer with a fixed list.
        Heights(Vec<f64>),
        /// Fail the call.
        Fail(TerrainError),
        /// Wait for the test to release the call, then answer with `lat + lon`.
        Gated(oneshot::Receiver<()>),
    }

    /// Mock backend recording every coordinate list it receives.
    #[derive(Default)]
    pub struct MockQueryService {
        pub calls: Mutex<Vec<Vec<Coordinate>>>,
        pub replies: Mutex<VecDeque<Reply>>,
    }

    impl MockQueryService {
        pub fn with_replies(replies: Vec<Reply>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
            }
        }

        pub fn calls(&self) -> Vec<Vec<Coordinate>> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub fn echo(coordinates: &[Coordinate]) -> Vec<f64> {
        coordinates.iter().map(|c| c.lat + c.lon).collect()
    }

    #[async_trait]
    impl QueryService for MockQueryService {
        async fn request_heights(&self, coordinates: &[Coordinate]) -> Result<Vec<f64>> {
            self.calls.lock().unwrap().push(coordinates.to_vec());
            let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Echo);
            match reply {
                Reply::Echo => Ok(echo(coordinates)),
                Reply::Heights(h) => Ok(h),
                Reply::Fail(e) => Err(e),
                Reply::Gated(rx) => {
                    let _ = rx.await;
                    Ok(echo(coordinates))
                }
            }
        }

        async fn request_path_heights(
            &self,
            from: Coordinate,
            to: Coordinate,
        ) -> Result<PathHeights> {
            Ok(PathHeights {
                lat_step: to.lat - from.lat,
                lon_step: to.lon - from.lon,
                heights: echo(&[from, to]),
            })
        }

        async fn request_carpet_heights(
            &self,
            sw: Coordinate,
            ne: Coordinate,
            stats_only: bool,
        ) -> Result<CarpetHeights> {
            let carpet = if stats_only {
                Vec::new()
            } else {
                vec![echo(&[sw, ne])]
            };
            Ok(CarpetHeights {
                min_height: sw.lat + sw.lon,
                max_height: ne.lat + ne.lon,
                carpet,
            })
        }
    }
}
