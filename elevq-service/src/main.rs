//! elevq Service - HTTP microservice for batched terrain height queries.
//!
//! Concurrent point queries arriving within one batch interval are merged
//! into a single upstream request.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ELEVQ_BATCH_INTERVAL_MS` | Dispatch interval in milliseconds | 500 |
//! | `ELEVQ_API_URL` | AirMap-style elevation endpoint | `https://api.airmap.com/elevation/v1/ele` |
//! | `ELEVQ_API_KEY` | API key sent as `X-API-Key` | None |
//! | `ELEVQ_TIMEOUT_SECS` | Upstream request timeout | 30 |
//! | `ELEVQ_PATH_SPACING_M` | Distance between path samples | 30 |
//! | `ELEVQ_PATH_MAX_SAMPLES` | Maximum samples per path | 1000 |
//! | `ELEVQ_PORT` | HTTP server port | 8080 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /elevation?lat=X&lon=Y` - Height at one coordinate
//! - `POST /elevation` - Heights for a point list
//! - `GET /path` - Heights along a straight path
//! - `POST /path` - Heights along each leg of a multi-point path
//! - `GET /carpet` - Heights over a rectangular area
//! - `POST /geojson` - Add heights to a GeoJSON geometry
//! - `GET /health` - Health check
//! - `GET /stats` - Batching statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use elevq::TerrainServiceBuilder;
use elevq_service::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "elevq=info,elevq_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("ELEVQ_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The library handles the ELEVQ_* batching, upstream and path variables
    let terrain = TerrainServiceBuilder::from_env()?.build()?;

    tracing::info!(
        batch_interval_ms = terrain.batch_interval().as_millis() as u64,
        path_spacing_m = terrain.path_sampler().spacing_m(),
        port = port,
        "Starting elevq service"
    );

    let state = Arc::new(AppState {
        terrain: terrain.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the in-flight batch finish; queued requests are failed
    terrain.shutdown();
    tracing::info!("elevq service stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
