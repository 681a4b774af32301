//! CLI entry point for the transit snapshot tool.
//!
//! `real-time` fetches one GTFS-RT snapshot and flattens its trip updates into
//! a per-stop CSV. `static` fetches the schedule archive, extracts it and
//! reduces it to the rows relevant to the coming days.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use gtfs_snapshot::{
    archive::unpack_download,
    fetch::{BasicClient, load_source},
    layout::{RealtimeRun, StaticRun},
    output::{log_summary, write_stop_records},
    realtime::decode_stop_records,
    schedule::{DEFAULT_EXCLUDED_ROUTE, DEFAULT_WINDOW_DAYS, ReduceOptions, reduce_directory},
};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_snapshot")]
#[command(about = "Fetch transit feed snapshots and reduce them to analysis-ready tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one realtime snapshot and flatten its trip updates to CSV
    RealTime {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL", env = "REALTIME_URL")]
        source: String,

        /// Directory receiving the raw snapshot and its CSV
        #[arg(short, long, env = "PATH_RT", default_value = "data/real_time")]
        output_dir: PathBuf,
    },
    /// Fetch the schedule archive and reduce it to the coming days
    Static {
        /// URL or path of the schedule zip, or a directory of extracted tables
        #[arg(value_name = "ZIP_OR_URL_OR_DIR", env = "STATIC_URL")]
        source: String,

        /// Directory receiving the extracted and reduced tables
        #[arg(short, long, env = "PATH_STATIC", default_value = "data/static")]
        output_dir: PathBuf,

        /// Reference date (YYYY-MM-DD) for the service window; defaults to today
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Days after the reference date to keep
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
        window_days: u32,

        /// route_short_name of routes to drop
        #[arg(long, default_value = DEFAULT_EXCLUDED_ROUTE)]
        exclude_route: String,
    },
}

/// Logging setup: colored stderr + JSON rolling log file.
fn init_tracing() -> Result<WorkerGuard> {
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_snapshot.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_snapshot.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let _file_guard = init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::RealTime { source, output_dir } => {
            run_realtime(&source, &output_dir).await?;
        }
        Commands::Static {
            source,
            output_dir,
            today,
            window_days,
            exclude_route,
        } => {
            let options = ReduceOptions {
                window_days,
                excluded_route_short_name: exclude_route,
            };
            run_static(&source, &output_dir, today, options).await?;
        }
    }

    Ok(())
}

/// Fetches one snapshot, keeps the raw bytes and writes the flattened CSV
/// next to them. A snapshot that fails to decode produces no CSV.
#[tracing::instrument(skip_all, fields(source = %source))]
async fn run_realtime(source: &str, output_dir: &Path) -> Result<()> {
    let run = RealtimeRun::new(output_dir, Local::now().naive_local());
    info!(raw = %run.raw_path.display(), "Starting real-time run");

    let client = BasicClient::new();
    let bytes = load_source(&client, source)
        .await
        .context("fetching realtime feed")?;

    fs::create_dir_all(output_dir)?;
    fs::write(&run.raw_path, &bytes)
        .with_context(|| format!("saving {}", run.raw_path.display()))?;

    let snapshot = decode_stop_records(&bytes)
        .with_context(|| format!("decoding {}", run.raw_path.display()))?;
    write_stop_records(&run.csv_path, &snapshot.records)?;

    info!(
        csv = %run.csv_path.display(),
        rows = snapshot.records.len(),
        "Real-time snapshot written"
    );
    log_summary("real_time", &snapshot.summary)
}

/// Fetches and extracts the schedule archive (unless `source` is already an
/// extracted directory) and writes the reduced tables.
#[tracing::instrument(skip_all, fields(source = %source))]
async fn run_static(
    source: &str,
    output_dir: &Path,
    today: Option<NaiveDate>,
    options: ReduceOptions,
) -> Result<()> {
    let started = Local::now().naive_local();
    let today = today.unwrap_or(started.date());
    let run = StaticRun::new(output_dir, started);
    info!(%today, dir = %run.extract_dir.display(), "Starting static run");

    let input_dir = if Path::new(source).is_dir() {
        PathBuf::from(source)
    } else {
        let client = BasicClient::new();
        let bytes = load_source(&client, source)
            .await
            .context("fetching schedule archive")?;
        fs::create_dir_all(output_dir)?;
        unpack_download(&bytes, &run.zip_path, &run.extract_dir)
            .with_context(|| format!("extracting {}", run.zip_path.display()))?;
        run.extract_dir.clone()
    };

    let reduced_dir = run.reduced_dir.clone();
    let summary = tokio::task::spawn_blocking(move || {
        reduce_directory(&input_dir, &reduced_dir, today, &options)
    })
    .await?
    .context("reducing schedule")?;

    log_summary("static", &summary)
}
