use anyhow::{Context, Result};
use elevq::{Coordinate, TerrainService};
use serde::Serialize;

use super::parse_point;

#[derive(Serialize)]
struct ElevationResponse {
    lat: f64,
    lon: f64,
    elevation: f64,
}

pub async fn run(
    service: &TerrainService,
    single: Option<(f64, f64)>,
    points: &[String],
    json: bool,
) -> Result<()> {
    let coordinates = match single {
        Some((lat, lon)) => vec![Coordinate::new(lat, lon)],
        None => points
            .iter()
            .map(|p| parse_point(p))
            .collect::<Result<Vec<_>>>()?,
    };

    let heights = service
        .get_heights(coordinates.clone())
        .await
        .context("Failed to get elevation")?;

    let responses: Vec<ElevationResponse> = coordinates
        .iter()
        .zip(heights)
        .map(|(c, elevation)| ElevationResponse {
            lat: c.lat,
            lon: c.lon,
            elevation,
        })
        .collect();

    match (json, responses.as_slice()) {
        (true, [response]) => println!("{}", serde_json::to_string(response)?),
        (true, _) => println!("{}", serde_json::to_string(&responses)?),
        (false, [response]) => println!("{:.2}", response.elevation),
        (false, _) => {
            for r in &responses {
                println!("{:.6}\t{:.6}\t{:.2}", r.lat, r.lon, r.elevation);
            }
        }
    }

    Ok(())
}
