//! Path and poly-path height queries.
//!
//! A path is sampled into evenly spaced points which are submitted as one
//! point request through the batching coordinator, so concurrent path queries
//! share service calls with every other caller. A poly-path runs one path
//! query per leg, strictly in sequence.

use std::sync::Arc;

use serde::Serialize;

use crate::batch::{BatchHandle, Caller};
use crate::coord::Coordinate;
use crate::error::{Result, TerrainError};
use crate::query::{PathHeights, QueryService};

/// Default distance between path samples, in meters.
pub const DEFAULT_PATH_SPACING_M: f64 = 30.0;

/// Default upper bound on samples per path.
pub const DEFAULT_PATH_MAX_SAMPLES: usize = 1000;

/// Evenly spaced points along a path plus the per-sample step in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPath {
    pub points: Vec<Coordinate>,
    pub lat_step: f64,
    pub lon_step: f64,
}

/// Decides how many points a path is split into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSampler {
    spacing_m: f64,
    max_samples: usize,
}

impl Default for PathSampler {
    fn default() -> Self {
        Self {
            spacing_m: DEFAULT_PATH_SPACING_M,
            max_samples: DEFAULT_PATH_MAX_SAMPLES,
        }
    }
}

impl PathSampler {
    /// Create a sampler with the given spacing and sample cap.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Config`] if `spacing_m` is not a positive
    /// finite number or `max_samples` is below 2.
    pub fn new(spacing_m: f64, max_samples: usize) -> Result<Self> {
        if !spacing_m.is_finite() || spacing_m <= 0.0 {
            return Err(TerrainError::Config {
                message: format!("path spacing must be positive, got {spacing_m}"),
            });
        }
        if max_samples < 2 {
            return Err(TerrainError::Config {
                message: format!("path needs at least 2 samples, got {max_samples}"),
            });
        }
        Ok(Self {
            spacing_m,
            max_samples,
        })
    }

    pub fn spacing_m(&self) -> f64 {
        self.spacing_m
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Number of samples for the path, endpoints included.
    pub fn sample_count(&self, from: &Coordinate, to: &Coordinate) -> usize {
        let distance = from.distance_to(to);
        let n = (distance / self.spacing_m).ceil() as usize + 1;
        n.clamp(2, self.max_samples)
    }

    /// Split the straight line between `from` and `to` into samples.
    ///
    /// A zero-length path yields two identical samples.
    pub fn sample(&self, from: &Coordinate, to: &Coordinate) -> SampledPath {
        let n = self.sample_count(from, to);
        let last = (n - 1) as f64;

        let points = (0..n)
            .map(|i| from.lerp(to, i as f64 / last))
            .collect();

        SampledPath {
            points,
            lat_step: (to.lat - from.lat) / last,
            lon_step: (to.lon - from.lon) / last,
        }
    }
}

/// Heights along a single straight path, sampled through the coordinator.
///
/// The query owns its [`Caller`]; dropping the future returned by
/// [`PathQuery::run`] cancels the request.
pub struct PathQuery {
    caller: Caller,
    sampler: PathSampler,
}

impl PathQuery {
    pub fn new(caller: Caller, sampler: PathSampler) -> Self {
        Self { caller, sampler }
    }

    /// Sample the path, wait for the batched heights and repackage them.
    pub async fn run(self, from: Coordinate, to: Coordinate) -> Result<PathHeights> {
        from.validate()?;
        to.validate()?;

        let path = self.sampler.sample(&from, &to);
        tracing::debug!(
            caller = %self.caller.id(),
            samples = path.points.len(),
            "Requesting path heights"
        );

        let heights = self.caller.request_heights(path.points).await?;

        Ok(PathHeights {
            lat_step: path.lat_step,
            lon_step: path.lon_step,
            heights,
        })
    }
}

/// Ask the backend for a path directly, bypassing point batching.
pub async fn request_remote_path(
    service: &Arc<dyn QueryService>,
    from: Coordinate,
    to: Coordinate,
) -> Result<PathHeights> {
    from.validate()?;
    to.validate()?;
    service.request_path_heights(from, to).await
}

/// Per-leg results of a poly-path query, in leg order.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyPathHeights {
    pub legs: Vec<Result<PathHeights>>,
}

impl PolyPathHeights {
    /// Returns `true` if every leg succeeded.
    pub fn is_complete(&self) -> bool {
        self.legs.iter().all(|leg| leg.is_ok())
    }

    /// Number of legs that failed.
    pub fn failed_legs(&self) -> usize {
        self.legs.iter().filter(|leg| leg.is_err()).count()
    }

    /// Concatenated heights of all successful legs.
    ///
    /// A vertex shared by two successful adjacent legs appears once; after a
    /// failed leg the next leg's first height is kept.
    pub fn joined_heights(&self) -> Vec<f64> {
        let mut joined: Vec<f64> = Vec::new();
        let mut previous_ok = false;
        for leg in &self.legs {
            match leg {
                Ok(path) => {
                    joined.extend(path.heights.iter().skip(usize::from(previous_ok)));
                    previous_ok = true;
                }
                Err(_) => previous_ok = false,
            }
        }
        joined
    }
}

/// Serializable view of one leg, used by the HTTP service and CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LegReport {
    Ok(PathHeights),
    Failed { error: String },
}

impl From<&Result<PathHeights>> for LegReport {
    fn from(leg: &Result<PathHeights>) -> Self {
        match leg {
            Ok(heights) => LegReport::Ok(heights.clone()),
            Err(e) => LegReport::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Heights along consecutive legs of a multi-point path.
pub struct PolyPathQuery {
    handle: BatchHandle,
    sampler: PathSampler,
}

impl PolyPathQuery {
    pub fn new(handle: BatchHandle, sampler: PathSampler) -> Self {
        Self { handle, sampler }
    }

    /// Run one path query per leg, each only after the previous one resolved.
    ///
    /// A failed leg is recorded and the next leg still runs.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidPath`] for fewer than two coordinates.
    pub async fn run(&self, coordinates: &[Coordinate]) -> Result<PolyPathHeights> {
        if coordinates.len() < 2 {
            return Err(TerrainError::InvalidPath {
                reason: format!(
                    "poly-path needs at least 2 coordinates, got {}",
                    coordinates.len()
                ),
            });
        }

        let mut legs = Vec::with_capacity(coordinates.len() - 1);
        for (index, pair) in coordinates.windows(2).enumerate() {
            let query = PathQuery::new(self.handle.caller(), self.sampler);
            let leg = query.run(pair[0], pair[1]).await;
            if let Err(ref e) = leg {
                tracing::warn!(leg = index, error = %e, "Poly-path leg failed");
            }
            legs.push(leg);
        }

        Ok(PolyPathHeights { legs })
    }
}
