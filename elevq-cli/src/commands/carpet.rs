use anyhow::{Context, Result};
use elevq::{BoundingBox, TerrainService};

use super::parse_point;

pub async fn run(
    service: &TerrainService,
    sw: &str,
    ne: &str,
    stats_only: bool,
    json: bool,
) -> Result<()> {
    let bounds = BoundingBox::new(parse_point(sw)?, parse_point(ne)?)?;

    let carpet = service
        .carpet_heights(bounds, stats_only)
        .await
        .context("Failed to get carpet heights")?;

    if json {
        println!("{}", serde_json::to_string(&carpet)?);
        return Ok(());
    }

    println!("min: {:.2}", carpet.min_height);
    println!("max: {:.2}", carpet.max_height);
    for row in &carpet.carpet {
        let line: Vec<String> = row.iter().map(|h| format!("{:.2}", h)).collect();
        println!("{}", line.join("\t"));
    }

    Ok(())
}
