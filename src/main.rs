use clap::Parser;
use fare_engine::application::engine::{EnginePorts, FareEngine};
use fare_engine::domain::fare::Fare;
use fare_engine::domain::ports::FareStoreRef;
use fare_engine::domain::station::Station;
use fare_engine::infrastructure::clock::SystemClock;
use fare_engine::infrastructure::config::Config;
use fare_engine::infrastructure::in_memory::{
    InMemoryFareSchedule, InMemoryFareStore, InMemoryStationDirectory,
};
use fare_engine::infrastructure::logging::init_tracing;
use fare_engine::infrastructure::notification::TracingSink;
use fare_engine::infrastructure::payment::MockPaymentGateway;
use fare_engine::interfaces::csv::fare_reader::FareReader;
use fare_engine::interfaces::csv::replay::replay;
use fare_engine::interfaces::csv::station_reader::StationReader;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Replays a gate and passenger command script against the fare engine and
/// prints one CSV outcome row per command.
#[derive(Parser)]
#[command(name = "fare-engine", author, version, about, long_about = None)]
struct Cli {
    /// Command script CSV
    script: PathBuf,

    /// Station directory CSV (id, code, name, operational)
    #[arg(long)]
    stations: PathBuf,

    /// Fare schedule CSV (source, destination, amount, effective_from, effective_until)
    #[arg(long)]
    fares: PathBuf,

    /// TOML configuration file. Falls back to $FARE_ENGINE_CONFIG, then defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<FareStoreRef> {
    use fare_engine::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(&path).into_diagnostic()?;
            info!(path = %path.display(), "storage_opened");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryFareStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<FareStoreRef> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryFareStore::new()))
}

fn load_stations(path: &Path) -> Result<Vec<Station>> {
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot open stations file {}", path.display()))?;
    StationReader::new(file)
        .stations()
        .collect::<fare_engine::error::Result<Vec<_>>>()
        .into_diagnostic()
}

fn load_fares(path: &Path) -> Result<Vec<Fare>> {
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot open fares file {}", path.display()))?;
    FareReader::new(file)
        .fares()
        .collect::<fare_engine::error::Result<Vec<_>>>()
        .into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).into_diagnostic()?;
    init_tracing(&config.logging).into_diagnostic()?;

    let stations = load_stations(&cli.stations)?;
    let fares = load_fares(&cli.fares)?;
    info!(stations = stations.len(), fares = fares.len(), "reference_data_loaded");

    let store = open_store(cli.db_path.or_else(|| config.storage.db_path.clone()))?;
    let engine = FareEngine::new(
        &config,
        EnginePorts {
            store,
            stations: Arc::new(InMemoryStationDirectory::with_stations(stations)),
            fares: Arc::new(InMemoryFareSchedule::with_fares(fares)),
            payments: Arc::new(MockPaymentGateway::new()),
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
        },
    )
    .into_diagnostic()?;

    let script = File::open(&cli.script)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot open script {}", cli.script.display()))?;
    let stdout = io::stdout();
    replay(&engine, script, stdout.lock()).await.into_diagnostic()?;

    Ok(())
}
