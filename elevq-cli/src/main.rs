use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elevq::{AirMapConfig, TerrainService, TerrainServiceBuilder};
use std::path::PathBuf;
use std::time::Duration;

mod commands;

/// Batched terrain height CLI tool
#[derive(Parser)]
#[command(name = "elevq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// AirMap-style elevation endpoint
    #[arg(long, env = "ELEVQ_API_URL", global = true)]
    api_url: Option<String>,

    /// API key sent as X-API-Key
    #[arg(long, env = "ELEVQ_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Batch dispatch interval in milliseconds
    #[arg(
        short,
        long,
        env = "ELEVQ_BATCH_INTERVAL_MS",
        default_value = "500",
        global = true
    )]
    interval_ms: u64,

    /// Upstream request timeout in seconds
    #[arg(long, env = "ELEVQ_TIMEOUT_SECS", default_value = "30", global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query terrain heights of one or more coordinates
    Query {
        /// Latitude in decimal degrees
        #[arg(long, requires = "lon", conflicts_with = "points")]
        lat: Option<f64>,

        /// Longitude in decimal degrees
        #[arg(long, requires = "lat")]
        lon: Option<f64>,

        /// Points as "lat,lon", all sent in one request
        #[arg(required_unless_present = "lat")]
        points: Vec<String>,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Query heights along a path of two or more "lat,lon" points
    Path {
        /// Path vertices, e.g. 46.55,7.98 46.53,8.12
        #[arg(required = true, num_args = 2..)]
        points: Vec<String>,

        /// Use the upstream path endpoint instead of sampling (two points only)
        #[arg(long)]
        direct: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Query heights over a rectangular area
    Carpet {
        /// South-west corner as "lat,lon"
        #[arg(long)]
        sw: String,

        /// North-east corner as "lat,lon"
        #[arg(long)]
        ne: String,

        /// Only print min/max statistics
        #[arg(long)]
        stats_only: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add heights to every coordinate of a file
    Batch {
        /// Input file (CSV or GeoJSON)
        input: PathBuf,

        /// Output file (same format as input if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Rows per request (CSV only); requests are batched together upstream
        #[arg(long, default_value = "100")]
        chunk_size: usize,
    },
}

impl Cli {
    /// Build the terrain service from flags, falling back to the environment.
    fn terrain_service(&self) -> Result<TerrainService> {
        let mut airmap = AirMapConfig::default().with_timeout(self.timeout);
        if let Some(url) = &self.api_url {
            airmap.base_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            airmap = airmap.with_api_key(key.clone());
        }

        TerrainServiceBuilder::from_env()
            .context("Invalid ELEVQ_* environment configuration")?
            .batch_interval(Duration::from_millis(self.interval_ms))
            .airmap(airmap)
            .build()
            .context("Failed to create terrain service")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = cli.terrain_service()?;

    let result = match cli.command {
        Commands::Query {
            lat,
            lon,
            points,
            json,
        } => commands::query::run(&service, lat.zip(lon), &points, json).await,
        Commands::Path {
            points,
            direct,
            json,
        } => commands::path::run(&service, &points, direct, json).await,
        Commands::Carpet {
            sw,
            ne,
            stats_only,
            json,
        } => commands::carpet::run(&service, &sw, &ne, stats_only, json).await,
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
            chunk_size,
        } => commands::batch::run(&service, input, output, lat_col, lon_col, chunk_size).await,
    };

    service.shutdown();
    result
}
