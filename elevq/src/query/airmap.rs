//! AirMap-style HTTP elevation backend.
//!
//! This module is only available when the `airmap` feature is enabled.
//!
//! # Endpoints
//!
//! All three query shapes share one base URL and encode their coordinates in
//! a single `points` parameter as a flat `lat,lon,lat,lon,...` list:
//!
//! | Query | URL | `data` payload |
//! |-------|-----|----------------|
//! | points | `{base}?points=...` | `[h0, h1, ...]` |
//! | path | `{base}/path?points=from,to` | `[{"step": [lat, lon], "profile": [...]}]` |
//! | carpet | `{base}/carpet?points=sw,ne` | `[{"stats": {"min", "max"}, "carpet": [[...]]}]` |
//!
//! Every response is wrapped in `{"status": "success", "data": ...}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Request};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{CarpetHeights, PathHeights, QueryService};
use crate::coord::Coordinate;
use crate::error::{Result, TerrainError};

/// Default AirMap elevation endpoint.
pub const DEFAULT_AIRMAP_URL: &str = "https://api.airmap.com/elevation/v1/ele";

/// Default timeout for HTTP requests in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Decimal places used when formatting coordinates into the query string.
const COORD_PRECISION: usize = 10;

/// Configuration for [`AirMapQuery`].
#[derive(Debug, Clone)]
pub struct AirMapConfig {
    /// Base URL of the elevation API (no trailing slash required).
    pub base_url: String,
    /// Optional API key, sent as the `X-API-Key` header.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AirMapConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AIRMAP_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl AirMapConfig {
    /// Create a configuration pointing at a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Which endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Coordinates,
    Path,
    Carpet,
}

impl Endpoint {
    fn suffix(self) -> &'static str {
        match self {
            Endpoint::Coordinates => "",
            Endpoint::Path => "/path",
            Endpoint::Carpet => "/carpet",
        }
    }
}

/// Online terrain queries against an AirMap-compatible elevation API.
pub struct AirMapQuery {
    client: Client,
    config: AirMapConfig,
}

impl AirMapQuery {
    /// Create a new backend with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Config`] if the HTTP client cannot be created
    /// (e.g., TLS initialization failure).
    pub fn new(config: AirMapConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TerrainError::Config {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// Returns the configuration this backend was built with.
    pub fn config(&self) -> &AirMapConfig {
        &self.config
    }

    /// Build the GET request for an endpoint and its coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::Config`] if the base URL is not a valid URL.
    fn build_request(&self, endpoint: Endpoint, points: &[Coordinate]) -> Result<Request> {
        let url = format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.suffix()
        );

        let mut request = self
            .client
            .get(&url)
            .query(&[("points", format_points(points))]);
        if let Some(ref key) = self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        request.build().map_err(|e| TerrainError::Config {
            message: format!("Invalid elevation API URL {url:?}: {e}"),
        })
    }

    /// Perform a GET request and return the response body.
    async fn send_query(&self, endpoint: Endpoint, points: &[Coordinate]) -> Result<String> {
        let request = self.build_request(endpoint, points)?;
        tracing::debug!(url = %request.url(), "Sending terrain query");

        let response = self.client.execute(request).await?;

        if !response.status().is_success() {
            return Err(TerrainError::Transport {
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl QueryService for AirMapQuery {
    async fn request_heights(&self, coordinates: &[Coordinate]) -> Result<Vec<f64>> {
        let body = self.send_query(Endpoint::Coordinates, coordinates).await?;
        parse_coordinate_data(&body)
    }

    async fn request_path_heights(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<PathHeights> {
        let body = self.send_query(Endpoint::Path, &[from, to]).await?;
        parse_path_data(&body)
    }

    async fn request_carpet_heights(
        &self,
        sw: Coordinate,
        ne: Coordinate,
        stats_only: bool,
    ) -> Result<CarpetHeights> {
        let body = self.send_query(Endpoint::Carpet, &[sw, ne]).await?;
        parse_carpet_data(&body, stats_only)
    }
}

/// Format coordinates as the flat `lat,lon,lat,lon` list used by the API.
fn format_points(points: &[Coordinate]) -> String {
    points
        .iter()
        .map(|c| {
            format!(
                "{:.prec$},{:.prec$}",
                c.lat,
                c.lon,
                prec = COORD_PRECISION
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PathData {
    step: [f64; 2],
    profile: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct CarpetStats {
    min: f64,
    max: f64,
}

#[derive(Debug, Deserialize)]
struct CarpetData {
    stats: CarpetStats,
    #[serde(default)]
    carpet: Vec<Vec<f64>>,
}

/// Decode the envelope and return its `data` payload.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| TerrainError::InvalidResponse {
            reason: format!("Failed to parse response: {}", e),
        })?;

    if envelope.status != "success" {
        return Err(TerrainError::InvalidResponse {
            reason: format!(
                "Service returned status '{}': {}",
                envelope.status,
                envelope.message.unwrap_or_default()
            ),
        });
    }

    envelope.data.ok_or_else(|| TerrainError::InvalidResponse {
        reason: "Response has no data".to_string(),
    })
}

/// Take the single object the path and carpet endpoints wrap in an array.
fn first_entry<T>(entries: Vec<T>) -> Result<T> {
    entries
        .into_iter()
        .next()
        .ok_or_else(|| TerrainError::InvalidResponse {
            reason: "Response data array is empty".to_string(),
        })
}

fn parse_coordinate_data(body: &str) -> Result<Vec<f64>> {
    parse_envelope(body)
}

fn parse_path_data(body: &str) -> Result<PathHeights> {
    let path: PathData = first_entry(parse_envelope(body)?)?;
    Ok(PathHeights {
        lat_step: path.step[0],
        lon_step: path.step[1],
        heights: path.profile,
    })
}

fn parse_carpet_data(body: &str, stats_only: bool) -> Result<CarpetHeights> {
    let data: CarpetData = first_entry(parse_envelope(body)?)?;
    Ok(CarpetHeights {
        min_height: data.stats.min,
        max_height: data.stats.max,
        carpet: if stats_only { Vec::new() } else { data.carpet },
    })
}
