//! Terrain service facade.
//!
//! [`TerrainService`] bundles a query backend, the batching coordinator that
//! sits in front of it, and the path/carpet helpers, behind one handle that
//! is cheap to share across tasks.
//!
//! ```ignore
//! use elevq::{Coordinate, TerrainServiceBuilder};
//!
//! let service = TerrainServiceBuilder::from_env()?.build()?;
//!
//! // Concurrent calls within one batch interval share a single HTTP request
//! let heights = service
//!     .get_heights(vec![Coordinate::new(47.37, 8.54), Coordinate::new(46.55, 7.98)])
//!     .await?;
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::batch::{BatchHandle, BatchStats, Caller, DEFAULT_BATCH_INTERVAL};
use crate::carpet::CarpetQuery;
use crate::coord::{BoundingBox, Coordinate};
use crate::error::{Result, TerrainError};
use crate::path::{
    request_remote_path, PathQuery, PathSampler, PolyPathHeights, PolyPathQuery,
    DEFAULT_PATH_MAX_SAMPLES, DEFAULT_PATH_SPACING_M,
};
use crate::query::{CarpetHeights, PathHeights, QueryService};

#[cfg(feature = "airmap")]
use crate::query::{AirMapConfig, AirMapQuery};

/// Batched terrain height lookups against one query backend.
///
/// Cloning is cheap; clones share the coordinator and backend.
#[derive(Clone)]
pub struct TerrainService {
    handle: BatchHandle,
    backend: Arc<dyn QueryService>,
    sampler: PathSampler,
    batch_interval: Duration,
}

impl TerrainService {
    /// Start building a service.
    pub fn builder() -> TerrainServiceBuilder {
        TerrainServiceBuilder::new()
    }

    /// Register a new caller on the coordinator.
    ///
    /// Long-lived consumers that issue many requests should hold one caller
    /// and drop it (or call [`Caller::cancel`]) when they go away.
    pub fn caller(&self) -> Caller {
        self.handle.caller()
    }

    /// The underlying coordinator handle.
    pub fn handle(&self) -> &BatchHandle {
        &self.handle
    }

    /// Get heights for a list of coordinates through the batcher.
    ///
    /// Uses a fresh caller, so dropping the returned future cancels the request.
    pub async fn get_heights(&self, coordinates: Vec<Coordinate>) -> Result<Vec<f64>> {
        self.caller().request_heights(coordinates).await
    }

    /// Get the height of a single coordinate through the batcher.
    pub async fn get_height(&self, lat: f64, lon: f64) -> Result<f64> {
        let heights = self.get_heights(vec![Coordinate::new(lat, lon)]).await?;
        heights
            .first()
            .copied()
            .ok_or(TerrainError::ResponseShapeMismatch {
                expected: 1,
                actual: 0,
            })
    }

    /// Heights sampled along a straight path, batched with other callers.
    pub async fn path_heights(&self, from: Coordinate, to: Coordinate) -> Result<PathHeights> {
        PathQuery::new(self.caller(), self.sampler).run(from, to).await
    }

    /// Heights along a straight path from the backend's own path endpoint.
    pub async fn remote_path_heights(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<PathHeights> {
        request_remote_path(&self.backend, from, to).await
    }

    /// Heights along each leg of a multi-point path.
    pub async fn poly_path_heights(&self, coordinates: &[Coordinate]) -> Result<PolyPathHeights> {
        PolyPathQuery::new(self.handle.clone(), self.sampler)
            .run(coordinates)
            .await
    }

    /// Heights over a rectangular area, bypassing the batcher.
    pub async fn carpet_heights(
        &self,
        bounds: BoundingBox,
        stats_only: bool,
    ) -> Result<CarpetHeights> {
        CarpetQuery::new(Arc::clone(&self.backend))
            .run(bounds, stats_only)
            .await
    }

    /// Coordinator counters.
    pub fn stats(&self) -> BatchStats {
        self.handle.stats()
    }

    /// The configured dispatch interval.
    pub fn batch_interval(&self) -> Duration {
        self.batch_interval
    }

    /// The configured path sampler.
    pub fn path_sampler(&self) -> PathSampler {
        self.sampler
    }

    /// Stop the coordinator. See [`BatchHandle::shutdown`].
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }
}

/// Builder for [`TerrainService`].
///
/// ```ignore
/// use std::time::Duration;
/// use elevq::{AirMapConfig, TerrainServiceBuilder};
///
/// let service = TerrainServiceBuilder::new()
///     .batch_interval(Duration::from_millis(250))
///     .airmap(AirMapConfig::default().with_api_key("secret"))
///     .build()?;
/// ```
pub struct TerrainServiceBuilder {
    batch_interval: Duration,
    path_spacing_m: f64,
    path_max_samples: usize,
    backend: Option<Arc<dyn QueryService>>,
    #[cfg(feature = "airmap")]
    airmap: AirMapConfig,
}

impl Default for TerrainServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainServiceBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            batch_interval: DEFAULT_BATCH_INTERVAL,
            path_spacing_m: DEFAULT_PATH_SPACING_M,
            path_max_samples: DEFAULT_PATH_MAX_SAMPLES,
            backend: None,
            #[cfg(feature = "airmap")]
            airmap: AirMapConfig::default(),
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ELEVQ_BATCH_INTERVAL_MS` | Dispatch interval in milliseconds | 500 |
    /// | `ELEVQ_API_URL` | AirMap-style elevation endpoint* | `https://api.airmap.com/elevation/v1/ele` |
    /// | `ELEVQ_API_KEY` | API key sent as `X-API-Key`* | None |
    /// | `ELEVQ_TIMEOUT_SECS` | HTTP request timeout* | 30 |
    /// | `ELEVQ_PATH_SPACING_M` | Distance between path samples | 30 |
    /// | `ELEVQ_PATH_MAX_SAMPLES` | Maximum samples per path | 1000 |
    ///
    /// *Only used when the `airmap` feature is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Config`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::new();

        if let Some(ms) = env_parse::<u64>("ELEVQ_BATCH_INTERVAL_MS")? {
            builder.batch_interval = Duration::from_millis(ms);
        }
        if let Some(spacing) = env_parse::<f64>("ELEVQ_PATH_SPACING_M")? {
            builder.path_spacing_m = spacing;
        }
        if let Some(max) = env_parse::<usize>("ELEVQ_PATH_MAX_SAMPLES")? {
            builder.path_max_samples = max;
        }

        #[cfg(feature = "airmap")]
        {
            if let Ok(url) = std::env::var("ELEVQ_API_URL") {
                builder.airmap.base_url = url;
            }
            if let Ok(key) = std::env::var("ELEVQ_API_KEY") {
                if !key.is_empty() {
                    builder.airmap.api_key = Some(key);
                }
            }
            if let Some(timeout) = env_parse::<u64>("ELEVQ_TIMEOUT_SECS")? {
                builder.airmap.timeout_secs = timeout;
            }
        }

        Ok(builder)
    }

    /// Set the dispatch interval. Must be non-zero.
    ///
    /// Default is 500 ms.
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    /// Set the distance between path samples in meters.
    pub fn path_spacing(mut self, meters: f64) -> Self {
        self.path_spacing_m = meters;
        self
    }

    /// Set the maximum number of samples per path.
    pub fn path_max_samples(mut self, max: usize) -> Self {
        self.path_max_samples = max;
        self
    }

    /// Use a custom query backend instead of the default HTTP one.
    pub fn query_service(mut self, service: Arc<dyn QueryService>) -> Self {
        self.backend = Some(service);
        self
    }

    /// Configure the AirMap HTTP backend.
    ///
    /// Ignored when a backend was supplied through [`Self::query_service`].
    #[cfg(feature = "airmap")]
    pub fn airmap(mut self, config: AirMapConfig) -> Self {
        self.airmap = config;
        self
    }

    /// Build the service and spawn its coordinator task.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Config`] if the interval is zero, the path
    /// settings are invalid, no backend is available, the HTTP client cannot
    /// be created, or no tokio runtime is running.
    pub fn build(self) -> Result<TerrainService> {
        if self.batch_interval.is_zero() {
            return Err(TerrainError::Config {
                message: "batch interval must be greater than zero".to_string(),
            });
        }

        let sampler = PathSampler::new(self.path_spacing_m, self.path_max_samples)?;

        let backend: Arc<dyn QueryService> = match self.backend {
            Some(backend) => backend,
            #[cfg(feature = "airmap")]
            None => Arc::new(AirMapQuery::new(self.airmap)?),
            #[cfg(not(feature = "airmap"))]
            None => {
                return Err(TerrainError::Config {
                    message: "no query service configured".to_string(),
                })
            }
        };

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TerrainError::Config {
                message: "TerrainService must be built inside a tokio runtime".to_string(),
            });
        }

        let handle = BatchHandle::spawn(Arc::clone(&backend), self.batch_interval);

        tracing::info!(
            interval_ms = self.batch_interval.as_millis() as u64,
            path_spacing_m = sampler.spacing_m(),
            path_max_samples = sampler.max_samples(),
            "Terrain service started"
        );

        Ok(TerrainService {
            handle,
            backend,
            sampler,
            batch_interval: self.batch_interval,
        })
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| TerrainError::Config {
                message: format!("{name} has an invalid value: {raw:?}"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::mock::MockQueryService;

    fn mock_service() -> (TerrainService, Arc<MockQueryService>) {
        let mock = Arc::new(MockQueryService::default());
        let service = TerrainServiceBuilder::new()
            .query_service(mock.clone())
            .build()
            .unwrap();
        (service, mock)
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let result = TerrainServiceBuilder::new()
            .batch_interval(Duration::ZERO)
            .query_service(Arc::new(MockQueryService::default()))
            .build();
        assert!(matches!(result, Err(TerrainError::Config { .. })));
    }

    #[tokio::test]
    async fn test_bad_path_settings_rejected() {
        let result = TerrainServiceBuilder::new()
            .path_max_samples(1)
            .query_service(Arc::new(MockQueryService::default()))
            .build();
        assert!(matches!(result, Err(TerrainError::Config { .. })));
    }

    #[test]
    fn test_build_outside_runtime() {
        let result = TerrainServiceBuilder::new()
            .query_service(Arc::new(MockQueryService::default()))
            .build();
        assert!(matches!(result, Err(TerrainError::Config { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_get_heights_share_batch() {
        let (service, mock) = mock_service();

        let (a, b) = tokio::join!(
            service.get_heights(vec![Coordinate::new(1.0, 1.0)]),
            service.get_height(2.0, 2.0),
        );

        assert_eq!(a.unwrap(), vec![2.0]);
        assert_eq!(b.unwrap(), 4.0);
        assert_eq!(mock.calls().len(), 1);
        assert_eq!(service.stats().batches_dispatched, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_carpet_through_service() {
        let (service, _mock) = mock_service();
        let bounds =
            BoundingBox::new(Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)).unwrap();

        let carpet = service.carpet_heights(bounds, true).await.unwrap();
        assert!(carpet.carpet.is_empty());
        assert_eq!(carpet.max_height, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_service() {
        let (service, _mock) = mock_service();
        service.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = service.get_height(1.0, 1.0).await;
        assert_eq!(result, Err(TerrainError::CoordinatorShutdown));
    }

    #[test]
    fn test_from_env() {
        let vars = [
            "ELEVQ_BATCH_INTERVAL_MS",
            "ELEVQ_PATH_SPACING_M",
            "ELEVQ_PATH_MAX_SAMPLES",
        ];
        let original: Vec<_> = vars.iter().map(|v| std::env::var(v).ok()).collect();

        std::env::set_var("ELEVQ_BATCH_INTERVAL_MS", "250");
        std::env::set_var("ELEVQ_PATH_SPACING_M", "10.5");
        std::env::remove_var("ELEVQ_PATH_MAX_SAMPLES");

        let builder = TerrainServiceBuilder::from_env().unwrap();
        assert_eq!(builder.batch_interval, Duration::from_millis(250));
        assert_eq!(builder.path_spacing_m, 10.5);
        assert_eq!(builder.path_max_samples, DEFAULT_PATH_MAX_SAMPLES);

        std::env::set_var("ELEVQ_BATCH_INTERVAL_MS", "soon");
        assert!(TerrainServiceBuilder::from_env().is_err());

        // Restore original values
        for (var, value) in vars.iter().zip(original) {
            match value {
                Some(v) => std::env::set_var(var, v),
                None => std::env::remove_var(var),
            }
        }
    }
}
