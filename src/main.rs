// Santa Tracker backend
// Route table generation, CSV repair scripts and the HTTP gateways behind the map

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

mod cities;
mod config;
mod models;
mod patchers;
mod providers;
mod route_builder;
mod route_csv;
mod server;

use config::Config;
use models::{SentinelLocation, WeatherUpdate};
use providers::BlockingWeatherClient;
use route_csv::RouteTable;

#[derive(Parser)]
#[command(name = "santa-tracker", version, about = "Santa Tracker route tools and API server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Build a route CSV from a city table
    BuildRoute {
        #[arg(long)]
        cities: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Mission start (UTC, RFC 3339)
        #[arg(long, default_value = "2025-12-24T10:00:00Z")]
        start: DateTime<Utc>,
        /// Keep only the N most populous cities
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Move every date in a route file by a number of days
    ShiftDates {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        days: i64,
    },
    /// Write weather values from a JSON file into a route file
    PatchWeather {
        #[arg(long)]
        file: PathBuf,
        /// JSON array of {stop_number, temperature_c, condition, ...}
        #[arg(long)]
        updates: PathBuf,
    },
    /// Recompute UTC offsets and local times from the timezone database
    FixTimezones {
        #[arg(long)]
        file: PathBuf,
    },
    /// Fetch current weather for every stop of a route file
    FillWeather {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the headline numbers of a route file
    Summary {
        #[arg(long)]
        file: PathBuf,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    Registry::default()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(env_filter)
        .init();
}

fn main() -> Result<()> {
    _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to read configuration")?;

    match cli.command {
        Command::Serve { host, port, data_dir } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            let state = server::AppState::new(config)?;
            actix_web::rt::System::new()
                .block_on(server::run_server(state))
                .context("Server stopped with an error")?;
        }
        Command::BuildRoute { cities: cities_path, output, start, limit } => {
            let mut city_list = cities::load_cities(&cities_path)?;
            if let Some(limit) = limit {
                city_list = cities::most_populous(city_list, limit);
                info!("Keeping the {} most populous cities", city_list.len());
            }
            let stops = route_builder::build_route(&city_list, start, &SentinelLocation::north_pole())?;
            route_csv::write_route_file(&output, &stops)?;
            info!("Route with {} stops written to {}", stops.len(), output.display());
        }
        Command::ShiftDates { file, days } => {
            rewrite(&file, |table| patchers::shift_dates(table, days).map(|_| ()))?;
        }
        Command::PatchWeather { file, updates } => {
            let raw = std::fs::read_to_string(&updates)
                .with_context(|| format!("Failed to read {}", updates.display()))?;
            let updates: Vec<WeatherUpdate> = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid weather updates in {}", updates.display()))?;
            rewrite(&file, |table| {
                patchers::patch_weather(table, &updates);
                Ok(())
            })?;
        }
        Command::FixTimezones { file } => {
            rewrite(&file, |table| patchers::fix_timezones(table).map(|_| ()))?;
        }
        Command::FillWeather { file } => {
            let client = BlockingWeatherClient::new(&config)?;
            rewrite(&file, |table| {
                patchers::fill_weather(table, |lat, lon| client.current(lat, lon)).map(|_| ())
            })?;
        }
        Command::Summary { file } => {
            let stops = route_csv::read_route_file(&file)?;
            match route_builder::summarize(&stops) {
                Some(summary) => info!(
                    "{}: {} cities in {} timezone groups, departs {} and returns {}",
                    file.display(),
                    summary.cities,
                    summary.groups,
                    summary.departure,
                    summary.arrival
                ),
                None => info!("{} has no stops", file.display()),
            }
        }
    }

    Ok(())
}

/// Load a route file, apply `patch`, and write the whole file back.
fn rewrite<F>(path: &Path, patch: F) -> Result<()>
where
    F: FnOnce(&mut RouteTable) -> models::Result<()>,
{
    let mut table = RouteTable::load(path)?;
    patch(&mut table).with_context(|| format!("Failed to patch {}", path.display()))?;
    table.save(path)?;
    Ok(())
}
