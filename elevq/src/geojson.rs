//! GeoJSON elevation enrichment.
//!
//! This module adds terrain heights to GeoJSON geometries. Enable the
//! `geojson` feature to use it.
//!
//! Every position of a geometry is collected into a single point request, so
//! a whole LineString or Polygon costs one slot in a batch rather than one
//! per vertex.
//!
//! # Example
//!
//! ```ignore
//! use elevq::geojson::add_heights_to_geometry;
//! use geojson::Geometry;
//!
//! let geometry: Geometry = r#"{"type": "Point", "coordinates": [138.7274, 35.3606]}"#
//!     .parse()
//!     .unwrap();
//!
//! let enriched = add_heights_to_geometry(&service.caller(), geometry).await?;
//! // Result: {"type": "Point", "coordinates": [138.7274, 35.3606, 3776.0]}
//! ```

use geojson::{Geometry, Position, Value as GeoJsonValue};

use crate::batch::Caller;
use crate::coord::Coordinate;
use crate::error::{Result, TerrainError};

/// Add heights to all positions of a GeoJSON geometry.
///
/// Positions are read in GeoJSON order, `[longitude, latitude]` or
/// `[longitude, latitude, altitude]`, and written back as
/// `[longitude, latitude, height]`. Any existing altitude is replaced.
///
/// Supported geometry types: Point, MultiPoint, LineString, MultiLineString,
/// Polygon, MultiPolygon and GeometryCollection.
///
/// # Errors
///
/// Returns an error if a position has fewer than 2 elements, a coordinate is
/// out of range, or the batched height request fails.
pub async fn add_heights_to_geometry(caller: &Caller, mut geometry: Geometry) -> Result<Geometry> {
    let mut coordinates = Vec::new();
    visit_positions(&mut geometry.value, &mut |position: &mut Position| {
        coordinates.push(position_to_coordinate(position)?);
        Ok(())
    })?;

    let expected = coordinates.len();
    let heights = caller.request_heights(coordinates).await?;
    if heights.len() != expected {
        return Err(TerrainError::ResponseShapeMismatch {
            expected,
            actual: heights.len(),
        });
    }

    let mut heights = heights.into_iter();
    visit_positions(&mut geometry.value, &mut |position: &mut Position| {
        if let Some(height) = heights.next() {
            position.truncate(2);
            position.push(height);
        }
        Ok(())
    })?;

    Ok(geometry)
}

/// Convert a GeoJSON position `[lon, lat, ...]` into a [`Coordinate`].
pub fn position_to_coordinate(position: &[f64]) -> Result<Coordinate> {
    match position {
        [lon, lat, ..] => Ok(Coordinate::new(*lat, *lon)),
        _ => Err(TerrainError::InvalidGeometry {
            reason: format!(
                "position must have at least 2 elements (lon, lat), got {}",
                position.len()
            ),
        }),
    }
}

/// Number of positions in a geometry, including nested collections.
pub fn count_positions(geometry: &Geometry) -> usize {
    match &geometry.value {
        GeoJsonValue::Point(_) => 1,
        GeoJsonValue::MultiPoint(points) | GeoJsonValue::LineString(points) => points.len(),
        GeoJsonValue::MultiLineString(lines) | GeoJsonValue::Polygon(lines) => {
            lines.iter().map(Vec::len).sum()
        }
        GeoJsonValue::MultiPolygon(polygons) => polygons
            .iter()
            .flat_map(|polygon| polygon.iter().map(Vec::len))
            .sum(),
        GeoJsonValue::GeometryCollection(geometries) => {
            geometries.iter().map(count_positions).sum()
        }
    }
}

/// Walk every position in document order.
fn visit_positions(
    value: &mut GeoJsonValue,
    f: &mut dyn FnMut(&mut Position) -> Result<()>,
) -> Result<()> {
    match value {
        GeoJsonValue::Point(position) => f(position),
        GeoJsonValue::MultiPoint(positions) | GeoJsonValue::LineString(positions) => {
            positions.iter_mut().try_for_each(|p| f(p))
        }
        GeoJsonValue::MultiLineString(lines) | GeoJsonValue::Polygon(lines) => lines
            .iter_mut()
            .flat_map(|line| line.iter_mut())
            .try_for_each(|p| f(p)),
        GeoJsonValue::MultiPolygon(polygons) => polygons
            .iter_mut()
            .flat_map(|polygon| polygon.iter_mut())
            .flat_map(|ring| ring.iter_mut())
            .try_for_each(|p| f(p)),
        GeoJsonValue::GeometryCollection(geometries) => geometries
            .iter_mut()
            .try_for_each(|g| visit_positions(&mut g.value, &mut *f)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchHandle;
    use crate::query::mock::MockQueryService;
    use std::sync::Arc;
    use std::time::Duration;

    fn spawn() -> (BatchHandle, Arc<MockQueryService>) {
        let mock = Arc::new(MockQueryService::default());
        let handle = BatchHandle::spawn(mock.clone(), Duration::from_millis(500));
        (handle, mock)
    }

    #[test]
    fn test_position_to_coordinate() {
        let coord = position_to_coordinate(&[138.5, 35.5]).unwrap();
        assert_eq!(coord, Coordinate::new(35.5, 138.5));

        // Altitude ignored
        let coord = position_to_coordinate(&[138.5, 35.5, 1200.0]).unwrap();
        assert_eq!(coord.lat, 35.5);

        assert!(matches!(
            position_to_coordinate(&[138.5]),
            Err(TerrainError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_count_positions() {
        let polygon = Geometry::new(GeoJsonValue::Polygon(vec![vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 0.0],
        ]]));
        assert_eq!(count_positions(&polygon), 4);

        let collection = Geometry::new(GeoJsonValue::GeometryCollection(vec![
            Geometry::new(GeoJsonValue::Point(vec![0.0, 0.0])),
            polygon,
        ]));
        assert_eq!(count_positions(&collection), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_point_enrichment() {
        let (handle, _mock) = spawn();
        let caller = handle.caller();

        let point = Geometry::new(GeoJsonValue::Point(vec![138.5, 35.5]));
        let result = add_heights_to_geometry(&caller, point).await.unwrap();

        match result.value {
            GeoJsonValue::Point(coord) => assert_eq!(coord, vec![138.5, 35.5, 174.0]),
            _ => panic!("Expected Point"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_linestring_is_one_request() {
        let (handle, mock) = spawn();
        let caller = handle.caller();

        let line = Geometry::new(GeoJsonValue::LineString(vec![
            vec![1.0, 2.0, 99.0],
            vec![3.0, 4.0],
            vec![5.0, 6.0],
        ]));
        let result = add_heights_to_geometry(&caller, line).await.unwrap();

        match result.value {
            GeoJsonValue::LineString(coords) => {
                assert_eq!(coords[0], vec![1.0, 2.0, 3.0]);
                assert_eq!(coords[1], vec![3.0, 4.0, 7.0]);
                assert_eq!(coords[2], vec![5.0, 6.0, 11.0]);
            }
            _ => panic!("Expected LineString"),
        }

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], Coordinate::new(2.0, 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_geometry_collection_keeps_order() {
        let (handle, _mock) = spawn();
        let caller = handle.caller();

        let collection = Geometry::new(GeoJsonValue::GeometryCollection(vec![
            Geometry::new(GeoJsonValue::Point(vec![1.0, 1.0])),
            Geometry::new(GeoJsonValue::MultiPolygon(vec![vec![vec![
                vec![2.0, 2.0],
                vec![3.0, 3.0],
            ]]])),
        ]));
        let result = add_heights_to_geometry(&caller, collection).await.unwrap();

        let GeoJsonValue::GeometryCollection(geometries) = result.value else {
            panic!("Expected GeometryCollection");
        };
        match &geometries[1].value {
            GeoJsonValue::MultiPolygon(polygons) => {
                assert_eq!(polygons[0][0][1], vec![3.0, 3.0, 6.0]);
            }
            _ => panic!("Expected MultiPolygon"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_position_sends_nothing() {
        let (handle, mock) = spawn();
        let caller = handle.caller();

        let line = Geometry::new(GeoJsonValue::LineString(vec![vec![1.0, 2.0], vec![3.0]]));
        let result = add_heights_to_geometry(&caller, line).await;

        assert!(matches!(result, Err(TerrainError::InvalidGeometry { .. })));
        assert!(mock.calls().is_empty());
    }
}
