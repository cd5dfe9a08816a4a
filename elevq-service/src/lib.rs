//! elevq Service Library
//!
//! HTTP handlers, router and OpenAPI document for the terrain height service.
//! This library is used by both the elevq-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use elevq::TerrainService;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Batched terrain service for height queries.
    pub terrain: TerrainService,
}

// Re-export commonly used types for convenience
pub use handlers::{
    CarpetQuery, CarpetResponse, ElevationQuery, ElevationResponse, ElevationsResponse,
    ErrorResponse, HealthResponse, LegResponse, PathQuery, PathResponse, PointInput,
    PointsRequest, PolyPathResponse, StatsResponse,
};

/// OpenAPI documentation for the elevq service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "elevq Terrain Service",
        version = "0.1.0",
        description = "REST API for terrain heights, batching concurrent point queries into shared upstream requests.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "Pedro Sanz Martinez", url = "https://github.com/pedrosanzmtz/elevq")
    ),
    paths(
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::get_path,
        handlers::post_path,
        handlers::get_carpet,
        handlers::post_geojson,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::ElevationResponse,
            handlers::ElevationsResponse,
            handlers::PointInput,
            handlers::PointsRequest,
            handlers::PathResponse,
            handlers::LegResponse,
            handlers::PolyPathResponse,
            handlers::CarpetResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "elevation", description = "Terrain height query endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router with all routes and middleware.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/path", get(handlers::get_path).post(handlers::post_path))
        .route("/carpet", get(handlers::get_carpet))
        .route("/geojson", post(handlers::post_geojson))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
