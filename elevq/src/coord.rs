//! Geographic coordinate utilities.
//!
//! This module provides the [`Coordinate`] and [`BoundingBox`] types used by
//! every query shape, plus great-circle distance helpers used for path
//! sampling.
//!
//! Coordinates are WGS84 decimal degrees. Unlike GeoJSON, fields are always
//! named, so there is no `[lon, lat]` versus `[lat, lon]` ambiguity.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrainError};

/// Mean radius of Earth in meters (IUGG recommended value).
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees (-90 to 90).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
}

impl Coordinate {
    /// Create a new coordinate without validating it.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Check that the coordinate lies within the WGS84 range.
    ///
    /// # Examples
    ///
    /// ```
    /// use elevq::Coordinate;
    ///
    /// assert!(Coordinate::new(35.36, 138.72).validate().is_ok());
    /// assert!(Coordinate::new(91.0, 0.0).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if is_valid_coordinate(self.lat, self.lon) {
            Ok(())
        } else {
            Err(TerrainError::InvalidCoordinate {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }

    /// Great-circle distance to `other` in meters (haversine formula).
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        MEAN_EARTH_RADIUS_M * c
    }

    /// Linear interpolation in degree space; `t = 0` is `self`, `t = 1` is `other`.
    pub fn lerp(&self, other: &Coordinate, t: f64) -> Coordinate {
        Coordinate {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }
}

impl From<(f64, f64)> for Coordinate {
    /// Build from a `(lat, lon)` tuple.
    fn from((lat, lon): (f64, f64)) -> Self {
        Coordinate { lat, lon }
    }
}

/// Validate that a latitude/longitude pair is finite and inside the WGS84 range.
///
/// # Examples
///
/// ```
/// use elevq::coord::is_valid_coordinate;
///
/// assert!(is_valid_coordinate(35.5, 138.7));
/// assert!(is_valid_coordinate(-90.0, 180.0));
/// assert!(!is_valid_coordinate(90.5, 0.0));
/// assert!(!is_valid_coordinate(f64::NAN, 0.0));
/// ```
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)
}

/// Validate every coordinate of a list, failing on the first invalid one.
pub fn validate_all(coords: &[Coordinate]) -> Result<()> {
    coords.iter().try_for_each(Coordinate::validate)
}

/// A rectangular area given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// South-west corner.
    pub sw: Coordinate,
    /// North-east corner.
    pub ne: Coordinate,
}

impl BoundingBox {
    /// Create a bounding box, checking both corners and their ordering.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidCoordinate`] if a corner is out of range,
    /// or [`TerrainError::InvalidBounds`] if `sw` is not south-west of `ne`.
    pub fn new(sw: Coordinate, ne: Coordinate) -> Result<Self> {
        sw.validate()?;
        ne.validate()?;

        if sw.lat > ne.lat || sw.lon > ne.lon {
            return Err(TerrainError::InvalidBounds {
                sw_lat: sw.lat,
                sw_lon: sw.lon,
                ne_lat: ne.lat,
                ne_lon: ne.lon,
            });
        }

        Ok(Self { sw, ne })
    }

    /// Check whether a coordinate lies inside the box (edges inclusive).
    pub fn contains(&self, coord: &Coordinate) -> bool {
        (self.sw.lat..=self.ne.lat).contains(&coord.lat)
            && (self.sw.lon..=self.ne.lon).contains(&coord.lon)
    }
}
