use anyhow::{bail, Context, Result};
use elevq::path::LegReport;
use elevq::{PathHeights, TerrainService};
use serde::Serialize;

use super::parse_point;

#[derive(Serialize)]
struct PolyPathOutput {
    legs: Vec<LegReport>,
    failed_legs: usize,
}

pub async fn run(service: &TerrainService, points: &[String], direct: bool, json: bool) -> Result<()> {
    let coordinates = points
        .iter()
        .map(|p| parse_point(p))
        .collect::<Result<Vec<_>>>()?;

    if coordinates.len() == 2 {
        let (from, to) = (coordinates[0], coordinates[1]);
        let path = if direct {
            service.remote_path_heights(from, to).await
        } else {
            service.path_heights(from, to).await
        }
        .context("Failed to get path heights")?;

        if json {
            println!("{}", serde_json::to_string(&path)?);
        } else {
            print_profile(&path);
        }
        return Ok(());
    }

    if direct {
        bail!("--direct only supports a single two-point path");
    }

    let poly = service
        .poly_path_heights(&coordinates)
        .await
        .context("Failed to get poly-path heights")?;

    if json {
        let output = PolyPathOutput {
            legs: poly.legs.iter().map(LegReport::from).collect(),
            failed_legs: poly.failed_legs(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for (index, leg) in poly.legs.iter().enumerate() {
            match leg {
                Ok(path) => {
                    println!("# leg {}", index + 1);
                    print_profile(path);
                }
                Err(e) => println!("# leg {} failed: {}", index + 1, e),
            }
        }
        if !poly.is_complete() {
            eprintln!("{} of {} legs failed", poly.failed_legs(), poly.legs.len());
        }
    }

    Ok(())
}

/// One "lat_offset lon_offset height" line per sample.
fn print_profile(path: &PathHeights) {
    for (i, height) in path.heights.iter().enumerate() {
        let i = i as f64;
        println!(
            "{:.8}\t{:.8}\t{:.2}",
            path.lat_step * i,
            path.lon_step * i,
            height
        );
    }
}
