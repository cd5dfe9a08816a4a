//! Rectangular area ("carpet") queries.
//!
//! A carpet is one dense lookup over a bounding box, so it goes straight to
//! the [`QueryService`] instead of through the point batcher.

use std::sync::Arc;

use crate::coord::BoundingBox;
use crate::error::{Result, TerrainError};
use crate::query::{CarpetHeights, QueryService};

/// Heights for the area inside a bounding box.
pub struct CarpetQuery {
    service: Arc<dyn QueryService>,
}

impl CarpetQuery {
    pub fn new(service: Arc<dyn QueryService>) -> Self {
        Self { service }
    }

    /// Request the carpet for `bounds`.
    ///
    /// With `stats_only`, the returned grid is always empty.
    pub async fn run(&self, bounds: BoundingBox, stats_only: bool) -> Result<CarpetHeights> {
        tracing::debug!(
            sw_lat = bounds.sw.lat,
            sw_lon = bounds.sw.lon,
            ne_lat = bounds.ne.lat,
            ne_lon = bounds.ne.lon,
            stats_only,
            "Requesting carpet heights"
        );

        let mut carpet = self
            .service
            .request_carpet_heights(bounds.sw, bounds.ne, stats_only)
            .await?;

        if stats_only {
            carpet.carpet.clear();
        }

        if carpet.min_height > carpet.max_height {
            return Err(TerrainError::InvalidResponse {
                reason: format!(
                    "carpet min height {} above max height {}",
                    carpet.min_height, carpet.max_height
                ),
            });
        }

        Ok(carpet)
    }
}
