//! # elevq - Batched Terrain Height Queries
//!
//! Async library for fetching terrain heights from a remote elevation service
//! without spending one network round trip per caller.
//!
//! ## Features
//!
//! - **Batching**: point requests from many concurrent callers are merged into
//!   one service call per dispatch window and the response is split back
//! - **Cancellation**: dropping a [`Caller`] guarantees its pending requests
//!   never deliver a result
//! - **Paths and carpets**: sampled path profiles, multi-leg paths, and
//!   rectangular area grids
//! - **Pluggable backends**: anything implementing [`QueryService`]; the
//!   `airmap` feature provides an HTTP client for AirMap-style endpoints
//!
//! ## Quick Start
//!
//! ```ignore
//! use elevq::{Coordinate, TerrainServiceBuilder};
//!
//! let service = TerrainServiceBuilder::from_env()?.build()?;
//!
//! let caller = service.caller();
//! let heights = caller
//!     .request_heights(vec![Coordinate::new(46.5577, 7.9853)])
//!     .await?;
//! println!("Height: {}m", heights[0]);
//! ```
//!
//! ## Batching Model
//!
//! Requests are queued and dispatched on a fixed interval (500 ms by default).
//! At most one service call is outstanding at a time; requests arriving while
//! it runs are sent in the next window. A failed call fails every request in
//! its batch and is not retried.

pub mod batch;
pub mod carpet;
pub mod coord;
pub mod error;
pub mod path;
pub mod query;
pub mod service;

#[cfg(feature = "geojson")]
pub mod geojson;

// Re-export main types at crate root for convenience
pub use batch::{BatchHandle, BatchStats, Caller, CallerId, PendingHeights};
pub use coord::{BoundingBox, Coordinate};
pub use error::{Result, TerrainError};
pub use path::{PathSampler, PolyPathHeights};
pub use query::{CarpetHeights, PathHeights, QueryService};
pub use service::{TerrainService, TerrainServiceBuilder};

#[cfg(feature = "airmap")]
pub use query::{AirMapConfig, AirMapQuery};
