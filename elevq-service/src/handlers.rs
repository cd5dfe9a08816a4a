//! HTTP request handlers for the terrain service.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use elevq::{BatchStats, BoundingBox, CarpetHeights, Coordinate, PathHeights, TerrainError};
use geojson::Geometry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Query parameters for the single-point elevation endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
}

/// Successful elevation response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Terrain height in meters.
    pub elevation: f64,
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
}

/// A coordinate in a request body.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct PointInput {
    pub lat: f64,
    pub lon: f64,
}

impl From<PointInput> for Coordinate {
    fn from(point: PointInput) -> Self {
        Coordinate::new(point.lat, point.lon)
    }
}

/// Body for point-list and poly-path queries.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PointsRequest {
    pub points: Vec<PointInput>,
}

impl PointsRequest {
    fn coordinates(&self) -> Vec<Coordinate> {
        self.points.iter().copied().map(Coordinate::from).collect()
    }
}

/// Heights for a point list, in request order.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationsResponse {
    pub elevations: Vec<f64>,
}

/// Query parameters for the path endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PathQuery {
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
    /// Use the upstream path endpoint instead of batched point sampling.
    #[serde(default)]
    pub direct: bool,
}

/// Heights sampled along a path.
#[derive(Debug, Serialize, ToSchema)]
pub struct PathResponse {
    /// Latitude step between consecutive samples, in degrees.
    pub lat_step: f64,
    /// Longitude step between consecutive samples, in degrees.
    pub lon_step: f64,
    /// Heights in meters, starting at the origin.
    pub heights: Vec<f64>,
}

impl From<PathHeights> for PathResponse {
    fn from(path: PathHeights) -> Self {
        Self {
            lat_step: path.lat_step,
            lon_step: path.lon_step,
            heights: path.heights,
        }
    }
}

/// Result of one poly-path leg. Either the path fields or `error` are set.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct LegResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heights: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<elevq::Result<PathHeights>> for LegResponse {
    fn from(leg: elevq::Result<PathHeights>) -> Self {
        match leg {
            Ok(path) => Self {
                lat_step: Some(path.lat_step),
                lon_step: Some(path.lon_step),
                heights: Some(path.heights),
                error: None,
            },
            Err(e) => Self {
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

/// Per-leg results of a poly-path query.
#[derive(Debug, Serialize, ToSchema)]
pub struct PolyPathResponse {
    pub legs: Vec<LegResponse>,
}

/// Query parameters for the carpet endpoint.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CarpetQuery {
    pub sw_lat: f64,
    pub sw_lon: f64,
    pub ne_lat: f64,
    pub ne_lon: f64,
    /// Only return min/max statistics.
    #[serde(default)]
    pub stats_only: bool,
}

/// Heights over a rectangular area.
#[derive(Debug, Serialize, ToSchema)]
pub struct CarpetResponse {
    pub min_height: f64,
    pub max_height: f64,
    /// One row per latitude step; empty for stats-only queries.
    pub carpet: Vec<Vec<f64>>,
}

impl From<CarpetHeights> for CarpetResponse {
    fn from(carpet: CarpetHeights) -> Self {
        Self {
            min_height: carpet.min_height,
            max_height: carpet.max_height,
            carpet: carpet.carpet,
        }
    }
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Batching statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Upstream calls issued for point batches.
    pub batches_dispatched: u64,
    /// Upstream calls that failed.
    pub batches_failed: u64,
    /// Coordinates sent across all batches.
    pub coordinates_sent: u64,
    /// Requests answered (success or failure).
    pub requests_delivered: u64,
    /// Requests dropped because their caller went away.
    pub requests_discarded: u64,
    /// Requests waiting for the next dispatch window.
    pub requests_queued: u64,
    /// Average coordinates per batch.
    pub coordinates_per_batch: f64,
    /// Dispatch interval in milliseconds.
    pub batch_interval_ms: u64,
}

impl StatsResponse {
    fn new(stats: BatchStats, batch_interval_ms: u64) -> Self {
        Self {
            coordinates_per_batch: stats.coordinates_per_batch(),
            batches_dispatched: stats.batches_dispatched,
            batches_failed: stats.batches_failed,
            coordinates_sent: stats.coordinates_sent,
            requests_delivered: stats.requests_delivered,
            requests_discarded: stats.requests_discarded,
            requests_queued: stats.requests_queued,
            batch_interval_ms,
        }
    }
}

/// Get the terrain height at one coordinate.
///
/// The lookup joins the current batch window, so the response takes at least
/// one batch interval.
#[utoipa::path(
    get,
    path = "/elevation",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Height found", body = ElevationResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 502, description = "Upstream query failed", body = ErrorResponse),
        (status = 503, description = "Service shutting down", body = ErrorResponse)
    ),
    tag = "elevation"
)]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> impl IntoResponse {
    tracing::debug!(lat = query.lat, lon = query.lon, "Elevation query");

    match state.terrain.get_height(query.lat, query.lon).await {
        Ok(elevation) => {
            tracing::info!(
                lat = query.lat,
                lon = query.lon,
                elevation = elevation,
                "Elevation found"
            );
            (
                StatusCode::OK,
                Json(ElevationResponse {
                    elevation,
                    lat: query.lat,
                    lon: query.lon,
                }),
            )
                .into_response()
        }
        Err(e) => error_response("elevation", e),
    }
}

/// Get terrain heights for a list of coordinates.
#[utoipa::path(
    post,
    path = "/elevation",
    request_body = PointsRequest,
    responses(
        (status = 200, description = "Heights in request order", body = ElevationsResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 502, description = "Upstream query failed", body = ErrorResponse)
    ),
    tag = "elevation"
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PointsRequest>,
) -> impl IntoResponse {
    tracing::debug!(points = request.points.len(), "Point list query");

    match state.terrain.get_heights(request.coordinates()).await {
        Ok(elevations) => (StatusCode::OK, Json(ElevationsResponse { elevations })).into_response(),
        Err(e) => error_response("elevation", e),
    }
}

/// Get terrain heights along a straight path.
#[utoipa::path(
    get,
    path = "/path",
    params(PathQuery),
    responses(
        (status = 200, description = "Path profile", body = PathResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 502, description = "Upstream query failed", body = ErrorResponse)
    ),
    tag = "elevation"
)]
pub async fn get_path(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> impl IntoResponse {
    let from = Coordinate::new(query.from_lat, query.from_lon);
    let to = Coordinate::new(query.to_lat, query.to_lon);
    tracing::debug!(?from, ?to, direct = query.direct, "Path query");

    let result = if query.direct {
        state.terrain.remote_path_heights(from, to).await
    } else {
        state.terrain.path_heights(from, to).await
    };

    match result {
        Ok(path) => (StatusCode::OK, Json(PathResponse::from(path))).into_response(),
        Err(e) => error_response("path", e),
    }
}

/// Get terrain heights along each leg of a multi-point path.
///
/// A failed leg is reported in place and does not abort the others.
#[utoipa::path(
    post,
    path = "/path",
    request_body = PointsRequest,
    responses(
        (status = 200, description = "Per-leg results", body = PolyPathResponse),
        (status = 400, description = "Fewer than two points", body = ErrorResponse)
    ),
    tag = "elevation"
)]
pub async fn post_path(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PointsRequest>,
) -> impl IntoResponse {
    match state
        .terrain
        .poly_path_heights(&request.coordinates())
        .await
    {
        Ok(poly) => {
            let legs = poly.legs.into_iter().map(LegResponse::from).collect();
            (StatusCode::OK, Json(PolyPathResponse { legs })).into_response()
        }
        Err(e) => error_response("poly-path", e),
    }
}

/// Get terrain heights over a rectangular area.
#[utoipa::path(
    get,
    path = "/carpet",
    params(CarpetQuery),
    responses(
        (status = 200, description = "Area heights", body = CarpetResponse),
        (status = 400, description = "Invalid bounds", body = ErrorResponse),
        (status = 502, description = "Upstream query failed", body = ErrorResponse)
    ),
    tag = "elevation"
)]
pub async fn get_carpet(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CarpetQuery>,
) -> impl IntoResponse {
    let bounds = match BoundingBox::new(
        Coordinate::new(query.sw_lat, query.sw_lon),
        Coordinate::new(query.ne_lat, query.ne_lon),
    ) {
        Ok(bounds) => bounds,
        Err(e) => return error_response("carpet", e),
    };

    match state.terrain.carpet_heights(bounds, query.stats_only).await {
        Ok(carpet) => (StatusCode::OK, Json(CarpetResponse::from(carpet))).into_response(),
        Err(e) => error_response("carpet", e),
    }
}

/// Add terrain heights to a GeoJSON geometry.
///
/// All positions of the geometry are fetched in one batched request and
/// returned as `[lon, lat, height]`.
#[utoipa::path(
    post,
    path = "/geojson",
    request_body(content = serde_json::Value, description = "GeoJSON geometry"),
    responses(
        (status = 200, description = "Geometry with heights", body = serde_json::Value),
        (status = 400, description = "Invalid geometry", body = ErrorResponse),
        (status = 502, description = "Upstream query failed", body = ErrorResponse)
    ),
    tag = "elevation"
)]
pub async fn post_geojson(
    State(state): State<Arc<AppState>>,
    Json(geometry): Json<Geometry>,
) -> impl IntoResponse {
    tracing::debug!(
        positions = elevq::geojson::count_positions(&geometry),
        "GeoJSON query"
    );

    let caller = state.terrain.caller();
    match elevq::geojson::add_heights_to_geometry(&caller, geometry).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response("geojson", e),
    }
}

/// Status code for a terrain error. Upstream batch failures are 502.
fn error_status(e: &TerrainError) -> StatusCode {
    if e.is_batch_failure() {
        return StatusCode::BAD_GATEWAY;
    }
    match e {
        TerrainError::CoordinatorShutdown => StatusCode::SERVICE_UNAVAILABLE,
        TerrainError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Map a terrain error to a status code and JSON body.
fn error_response(endpoint: &str, e: TerrainError) -> axum::response::Response {
    let status = error_status(&e);

    tracing::warn!(endpoint = endpoint, error = %e, "Terrain query failed");

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse)),
    tag = "system"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get batching statistics.
#[utoipa::path(
    get,
    path = "/stats",
    responses((status = 200, description = "Coordinator counters", body = StatsResponse)),
    tag = "system"
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let interval_ms = state.terrain.batch_interval().as_millis() as u64;
    Json(StatsResponse::new(state.terrain.stats(), interval_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_request_deserialize() {
        let json = r#"{"points": [{"lat": 35.5, "lon": 138.7}, {"lat": -1.0, "lon": 2.0}]}"#;
        let request: PointsRequest = serde_json::from_str(json).unwrap();
        let coords = request.coordinates();
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0], Coordinate::new(35.5, 138.7));
    }

    #[test]
    fn test_leg_response_serialize() {
        let ok = LegResponse::from(Ok(PathHeights {
            lat_step: 0.1,
            lon_step: 0.0,
            heights: vec![1.0, 2.0],
        }));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["heights"][1], 2.0);
        assert!(json.get("error").is_none());

        let failed = LegResponse::from(Err(TerrainError::Transport {
            reason: "HTTP 503".to_string(),
        }));
        let json = serde_json::to_value(&failed).unwrap();
        assert!(json["error"].as_str().unwrap().contains("HTTP 503"));
        assert!(json.get("heights").is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let response = error_response(
            "test",
            TerrainError::InvalidCoordinate {
                lat: 91.0,
                lon: 0.0,
            },
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = error_response(
            "test",
            TerrainError::Transport {
                reason: "timeout".to_string(),
            },
        );
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = error_response("test", TerrainError::CoordinatorShutdown);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_status_follows_batch_failure() {
        let errors = [
            TerrainError::Transport {
                reason: "HTTP 500".to_string(),
            },
            TerrainError::ResponseShapeMismatch {
                expected: 2,
                actual: 1,
            },
            TerrainError::InvalidResponse {
                reason: "status: error".to_string(),
            },
            TerrainError::InvalidPath {
                reason: "one point".to_string(),
            },
            TerrainError::InvalidGeometry {
                reason: "short position".to_string(),
            },
            TerrainError::Config {
                message: "zero interval".to_string(),
            },
            TerrainError::Cancelled,
        ];
        for e in errors {
            let status = error_status(&e);
            assert_eq!(
                status == StatusCode::BAD_GATEWAY,
                e.is_batch_failure(),
                "{e}"
            );
        }
        assert_eq!(
            error_status(&TerrainError::InvalidGeometry {
                reason: String::new()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&TerrainError::Cancelled),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_health_via_oneshot() {
        use axum::{body::Body, http::Request, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new().route("/health", get(health_check));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
