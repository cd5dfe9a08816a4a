use anyhow::{bail, ensure, Context, Result};
use elevq::geojson::add_heights_to_geometry;
use elevq::{Coordinate, TerrainService};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Requests in flight at once; each one joins the coordinator's next window.
const CONCURRENT_REQUESTS: usize = 16;

pub async fn run(
    service: &TerrainService,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: String,
    lon_col: String,
    chunk_size: usize,
) -> Result<()> {
    ensure!(chunk_size > 0, "--chunk-size must be at least 1");

    // Detect file format
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let (suffix, default_ext) = match extension.as_str() {
        "csv" => ("_elevation", "csv"),
        "geojson" | "json" => ("_elevation", "geojson"),
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    };

    let output_path = match output {
        Some(path) => path,
        None => {
            let stem = input
                .file_stem()
                .context("Input path has no file name")?
                .to_string_lossy();
            input.with_file_name(format!("{}{}.{}", stem, suffix, default_ext))
        }
    };

    let summary = match extension.as_str() {
        "csv" => process_csv(service, &input, &output_path, &lat_col, &lon_col, chunk_size).await?,
        _ => process_geojson(service, &input, &output_path).await?,
    };

    let stats = service.stats();
    println!("Output written to: {}", output_path.display());
    println!(
        "{} items, {} failed, {} upstream requests ({:.1} coordinates per request)",
        summary.items,
        summary.failed,
        stats.batches_dispatched,
        stats.coordinates_per_batch()
    );
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct Summary {
    items: usize,
    failed: usize,
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

async fn process_csv(
    service: &TerrainService,
    input: &Path,
    output_path: &Path,
    lat_col: &str,
    lon_col: &str,
    chunk_size: usize,
) -> Result<Summary> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let coordinates = records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let lat: f64 = record
                .get(lat_idx)
                .context("Missing latitude")?
                .trim()
                .parse()
                .with_context(|| format!("Invalid latitude on row {}", row + 1))?;
            let lon: f64 = record
                .get(lon_idx)
                .context("Missing longitude")?
                .trim()
                .parse()
                .with_context(|| format!("Invalid longitude on row {}", row + 1))?;
            Ok(Coordinate::new(lat, lon))
        })
        .collect::<Result<Vec<_>>>()?;

    // Out-of-range rows fail on their own instead of failing their chunk
    let mut heights: Vec<Option<f64>> = vec![None; records.len()];
    let valid: Vec<(usize, Coordinate)> = coordinates
        .into_iter()
        .enumerate()
        .filter(|(row, coordinate)| match coordinate.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(row = row + 1, error = %e, "Skipping row");
                false
            }
        })
        .collect();

    let pb = progress_bar(records.len() as u64)?;
    pb.inc((records.len() - valid.len()) as u64);

    // One request per chunk, each from its own caller; results stay in row order
    let chunks: Vec<Option<Vec<f64>>> = stream::iter(valid.chunks(chunk_size))
        .map(|chunk| {
            let pb = &pb;
            async move {
                let count = chunk.len();
                let request = chunk.iter().map(|(_, c)| *c).collect();
                let result = match service.get_heights(request).await {
                    Ok(heights) => Some(heights),
                    Err(e) => {
                        tracing::warn!(rows = count, error = %e, "Chunk failed");
                        None
                    }
                };
                pb.inc(count as u64);
                result
            }
        })
        .buffered(CONCURRENT_REQUESTS)
        .collect()
        .await;
    pb.finish_with_message("done");

    for (chunk, result) in valid.chunks(chunk_size).zip(chunks) {
        if let Some(result) = result {
            for ((row, _), height) in chunk.iter().zip(result) {
                heights[*row] = Some(height);
            }
        }
    }

    let output_file = File::create(output_path).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("elevation");
    writer.write_record(&new_headers)?;

    let mut summary = Summary::default();
    for (record, height) in records.iter().zip(heights) {
        let elevation = match height {
            Some(height) => format!("{:.2}", height),
            None => {
                summary.failed += 1;
                "error".to_string()
            }
        };
        summary.items += 1;

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&elevation);
        writer.write_record(&new_record)?;
    }
    writer.flush()?;

    Ok(summary)
}

async fn process_geojson(
    service: &TerrainService,
    input: &Path,
    output_path: &Path,
) -> Result<Summary> {
    let file = File::open(input).context("Failed to open input file")?;
    let reader = BufReader::new(file);

    let geojson: geojson::GeoJson =
        serde_json::from_reader(reader).context("Failed to parse GeoJSON")?;

    let mut summary = Summary::default();
    let result = match geojson {
        geojson::GeoJson::Geometry(geometry) => {
            summary.items = 1;
            let enriched = add_heights_to_geometry(&service.caller(), geometry).await?;
            geojson::GeoJson::Geometry(enriched)
        }
        geojson::GeoJson::Feature(mut feature) => {
            summary.items = 1;
            if let Some(geometry) = feature.geometry.take() {
                feature.geometry = Some(add_heights_to_geometry(&service.caller(), geometry).await?);
            }
            geojson::GeoJson::Feature(feature)
        }
        geojson::GeoJson::FeatureCollection(mut fc) => {
            summary.items = fc.features.len();
            let pb = progress_bar(fc.features.len() as u64)?;

            // Features are enriched concurrently so their requests share batches
            let features = std::mem::take(&mut fc.features);
            fc.features = stream::iter(features)
                .map(|mut feature| {
                    let pb = &pb;
                    async move {
                        if let Some(geometry) = feature.geometry.take() {
                            let enriched =
                                add_heights_to_geometry(&service.caller(), geometry).await?;
                            feature.geometry = Some(enriched);
                        }
                        pb.inc(1);
                        Ok::<_, anyhow::Error>(feature)
                    }
                })
                .buffered(CONCURRENT_REQUESTS)
                .try_collect()
                .await?;

            pb.finish_with_message("done");
            geojson::GeoJson::FeatureCollection(fc)
        }
    };

    let output_file = File::create(output_path).context("Failed to create output file")?;
    let mut writer = BufWriter::new(output_file);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;

    Ok(summary)
}
