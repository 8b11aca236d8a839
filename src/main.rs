//! Incident Monitor
//!
//! Polls a public emergency map service, detects incident markers on the
//! rendered tiles and announces every new incident once.

mod detection;
mod logging;
mod monitor;
mod notify;
mod paths;
mod wms;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use detection::GeoBoundingBox;
use monitor::{CancelToken, IncidentWorker, JsonlIncidentStore, MonitorConfig, RunMode};
use notify::{LogNotifier, Notifier, TelegramNotifier};
use wms::WmsClient;

#[derive(Parser, Debug)]
#[command(name = "incident-monitor", version, about)]
struct Cli {
    /// Config file (defaults to config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Save raster, mask and annotated frames into this directory
    #[arg(long, global = true, value_name = "DIR")]
    debug_frames: Option<PathBuf>,

    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll continuously until Ctrl+C (default)
    Run,
    /// Run a single polling cycle and exit
    Once,
    /// Detect markers in a local image and print them as JSON
    Detect {
        image: PathBuf,
        /// Map extent of the image: minx,miny,maxx,maxy
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: GeoBoundingBox,
    },
}

/// Parses `minx,miny,maxx,maxy`.
fn parse_bbox(s: &str) -> Result<GeoBoundingBox, String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| format!("invalid number in bbox: {}", e))?;

    match values.as_slice() {
        &[min_x, min_y, max_x, max_y] => {
            GeoBoundingBox::new(min_x, min_y, max_x, max_y).map_err(|e| e.to_string())
        }
        _ => Err(format!("expected 4 comma-separated values, got {}", values.len())),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::install_panic_hook();

    // Ensure output directories exist
    paths::ensure_directories()?;

    let level = match (&cli.command, cli.verbose) {
        (_, true) => LevelFilter::Debug,
        // Keep stdout clean for the JSON output
        (Some(Command::Detect { .. }), false) => LevelFilter::Warn,
        _ => LevelFilter::Info,
    };
    let _logger = logging::init(&paths::get_logs_dir(), level)?;

    log::info!("Incident monitor {} starting", env!("CARGO_PKG_VERSION"));
    log::info!("Exe directory: {}", paths::get_exe_dir().display());

    let config_path = cli.config.clone().unwrap_or_else(paths::get_default_config_path);
    let mut config = monitor::load_config(&config_path);
    if let Some(dir) = cli.debug_frames {
        config.debug_frames_dir = Some(dir);
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, RunMode::Continuous),
        Command::Once => run(&config, RunMode::Once),
        Command::Detect { image, bbox } => detect_file(&config, &image, bbox),
    }
}

/// Runs the detector on a local image.
fn detect_file(config: &MonitorConfig, path: &Path, bbox: GeoBoundingBox) -> Result<()> {
    let raster = image::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?
        .to_rgb8();

    let batch = monitor::build_detector(config).detect_raster(&raster, bbox)?;
    println!("{}", serde_json::to_string_pretty(&batch)?);
    Ok(())
}

fn run(config: &MonitorConfig, mode: RunMode) -> Result<()> {
    if config.regions.is_empty() {
        return Err(anyhow!("No valid query regions configured"));
    }

    let token = CancelToken::new();
    {
        let token = token.clone();
        ctrlc::set_handler(move || {
            log::info!("Ctrl+C received, stopping after the current step");
            token.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    let client = WmsClient::new(config.wms.clone())?;
    let store = Arc::new(JsonlIncidentStore::open(&config.store_path())?);

    let notifier: Box<dyn Notifier> = match TelegramNotifier::from_config(&config.telegram)? {
        Some(telegram) => {
            log::info!("Alerts will be sent to Telegram");
            Box::new(telegram)
        }
        None => {
            log::warn!("Telegram credentials not configured. Alerts will only be logged.");
            Box::new(LogNotifier)
        }
    };

    let worker = IncidentWorker::new(Box::new(client.clone()), notifier, store.clone());
    let detector = monitor::build_detector(config);

    let summary = monitor::run_monitor(config, &detector, &client, worker, &token, mode)?;
    log::info!(
        "Finished after {} cycle(s): {} announced, {} already known, {} failed",
        summary.cycles,
        summary.worker.announced,
        summary.worker.already_known,
        summary.worker.failed
    );
    log::info!("{} incident(s) recorded in {}", store.len(), store.path().display());
    Ok(())
}
