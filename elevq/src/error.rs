//! Error types for the elevq library.

use thiserror::Error;

/// Errors that can occur when querying terrain heights.
///
/// The type is `Clone` because a single failed batch is reported to every
/// live caller that contributed coordinates to it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TerrainError {
    /// The query service call itself failed (network, HTTP status, timeout).
    #[error("Terrain query failed: {reason}")]
    Transport { reason: String },

    /// The service returned a different number of heights than coordinates sent.
    #[error("Terrain response shape mismatch: expected {expected} heights, got {actual}")]
    ResponseShapeMismatch { expected: usize, actual: usize },

    /// The service answered, but the body could not be understood.
    #[error("Invalid terrain response: {reason}")]
    InvalidResponse { reason: String },

    /// Coordinates are outside the valid WGS84 range.
    #[error("Invalid coordinate: lat={lat}, lon={lon} (valid: lat ±90°, lon ±180°)")]
    InvalidCoordinate { lat: f64, lon: f64 },

    /// A path or poly-path request could not be built.
    #[error("Invalid path: {reason}")]
    InvalidPath { reason: String },

    /// A GeoJSON geometry contains a position that is not `[lon, lat, ...]`.
    #[error("Invalid geometry: {reason}")]
    InvalidGeometry { reason: String },

    /// The south-west corner of an area is not south-west of the north-east corner.
    #[error(
        "Invalid bounds: sw=({sw_lat}, {sw_lon}) must be south-west of ne=({ne_lat}, {ne_lon})"
    )]
    InvalidBounds {
        sw_lat: f64,
        sw_lon: f64,
        ne_lat: f64,
        ne_lon: f64,
    },

    /// The caller was cancelled before its result was delivered.
    #[error("Terrain request cancelled")]
    Cancelled,

    /// The batching coordinator stopped before the request was answered.
    #[error("Terrain batch coordinator has shut down")]
    CoordinatorShutdown,

    /// The service could not be configured.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl TerrainError {
    /// Returns `true` for failures scoped to a whole batch (the remote call or its response).
    pub fn is_batch_failure(&self) -> bool {
        matches!(
            self,
            TerrainError::Transport { .. }
                | TerrainError::ResponseShapeMismatch { .. }
                | TerrainError::InvalidResponse { .. }
        )
    }
}

#[cfg(feature = "airmap")]
impl From<reqwest::Error> for TerrainError {
    fn from(e: reqwest::Error) -> Self {
        TerrainError::Transport {
            reason: e.to_string(),
        }
    }
}

/// Result type alias using [`TerrainError`].
pub type Result<T> = std::result::Result<T, TerrainError>;
