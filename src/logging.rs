//! Logging setup.
//!
//! Every line is timestamped with local time and written both to stdout and
//! to `<logs_dir>/incident_monitor.log`.

use anyhow::{Context, Result};
use chrono::Local;
use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{LevelFilter, Record};
use std::io::Write;
use std::path::Path;

/// Base name of the log file inside the logs directory.
const LOG_BASENAME: &str = "incident_monitor";

/// Crates whose chatter stays at warn whatever the requested level.
const QUIET_CRATES: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls"];

/// Log specification for `level`, with the HTTP stack kept quiet.
pub fn log_spec(level: LevelFilter) -> String {
    let mut spec = level.to_string().to_lowercase();
    for name in QUIET_CRATES {
        spec.push_str(&format!(", {}=warn", name));
    }
    spec
}

/// `[HH:MM:SS.mmm] LEVEL message`
pub fn line_format(
    w: &mut dyn Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    write!(
        w,
        "[{}] {:<5} {}",
        Local::now().format("%H:%M:%S%.3f"),
        record.level(),
        record.args()
    )
}

/// Starts the global logger. Call once at startup and keep the handle alive
/// until exit so the file writer is flushed.
pub fn init(logs_dir: &Path, level: LevelFilter) -> Result<LoggerHandle> {
    Logger::try_with_str(&log_spec(level))
        .context("Invalid log specification")?
        .log_to_file(
            FileSpec::default()
                .directory(logs_dir)
                .basename(LOG_BASENAME)
                .suppress_timestamp(),
        )
        .append()
        .format(line_format)
        .duplicate_to_stdout(Duplicate::All)
        .start()
        .context("Logger initialization failed")
}

/// Routes panics through the logger so they also land in the log file.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();

        log::error!("[PANIC]{} {}", location, msg);
        log::logger().flush();
    }));
}
