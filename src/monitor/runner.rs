//! Polling runner - main entry point for the monitor loop.
//!
//! Coordinates the polling loop and the incident worker thread.
//! Each cycle fetches every region's tile, detects markers, merges the
//! batches by fingerprint and hands the result to the worker.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::detection::{merge_batches, DetectionBatch, MarkerDetector};
use crate::monitor::config::MonitorConfig;
use crate::monitor::queue::{create_work_queue, IncidentWorkItem};
use crate::monitor::worker::{IncidentWorker, WorkerStats};
use crate::wms::TileProvider;

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Shared stop flag, set from the Ctrl-C handler.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short slices.
    ///
    /// Returns `true` if cancelled before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Poll until cancelled
    Continuous,
    /// Run a single cycle, wait for the worker and exit
    Once,
}

/// Result of one polling cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub regions_scanned: usize,
    pub regions_failed: usize,
    /// Distinct markers handed to the worker
    pub detections: usize,
}

/// Result of a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub worker: WorkerStats,
}

/// Runs one polling cycle over every configured region.
///
/// A region whose tile cannot be fetched or analyzed is logged and skipped.
/// Fails only if the worker is gone.
pub fn run_cycle(
    config: &MonitorConfig,
    detector: &MarkerDetector,
    tiles: &dyn TileProvider,
    sender: &Sender<IncidentWorkItem>,
    cycle: u64,
    token: &CancelToken,
) -> Result<CycleSummary> {
    let (width, height) = (config.wms.tile_width, config.wms.tile_height);
    let mut summary = CycleSummary::default();
    let mut batches: Vec<(String, DetectionBatch)> = Vec::with_capacity(config.regions.len());

    for region in &config.regions {
        if token.is_cancelled() {
            log::info!("Cycle {} interrupted", cycle);
            break;
        }
        summary.regions_scanned += 1;

        let raster = match tiles.fetch_tile(&region.bbox, width, height) {
            Ok(raster) => raster,
            Err(e) => {
                log::error!("Failed to fetch tile for '{}': {:#}", region.name, e);
                summary.regions_failed += 1;
                continue;
            }
        };

        match detector.detect(&raster, width, height, region.bbox) {
            Ok(batch) => {
                log::info!("Region '{}': {} marker(s)", region.name, batch.len());
                batches.push((region.name.clone(), batch));
            }
            Err(e) => {
                log::error!("Detection failed for '{}': {}", region.name, e);
                summary.regions_failed += 1;
            }
        }
    }

    for (region, detection) in merge_batches(batches) {
        sender
            .send(IncidentWorkItem::new(region, detection, cycle))
            .map_err(|_| anyhow!("Incident worker is no longer running"))?;
        summary.detections += 1;
    }

    Ok(summary)
}

/// Runs the monitor until cancelled (or after one cycle in [`RunMode::Once`]).
///
/// Spawns the incident worker, polls, then drops the sender and waits for the
/// worker to drain the queue.
pub fn run_monitor(
    config: &MonitorConfig,
    detector: &MarkerDetector,
    tiles: &dyn TileProvider,
    worker: IncidentWorker,
    token: &CancelToken,
    mode: RunMode,
) -> Result<RunSummary> {
    let (sender, receiver) = create_work_queue();
    let worker_handle = thread::spawn(move || worker.run(receiver));

    let interval = Duration::from_secs(config.poll_interval_secs);
    log::info!(
        "Monitoring {} region(s) every {}s (Ctrl+C to stop)",
        config.regions.len(),
        config.poll_interval_secs
    );

    let mut cycles = 0u64;
    while !token.is_cancelled() {
        cycles += 1;
        let started = Instant::now();

        match run_cycle(config, detector, tiles, &sender, cycles, token) {
            Ok(summary) => log::info!(
                "Cycle {} done in {:.1}s: {} region(s), {} failed, {} marker(s)",
                cycles,
                started.elapsed().as_secs_f64(),
                summary.regions_scanned,
                summary.regions_failed,
                summary.detections
            ),
            Err(e) => {
                log::error!("Cycle {} aborted: {:#}", cycles, e);
                break;
            }
        }

        if mode == RunMode::Once {
            break;
        }
        // The interval starts after the cycle, so cycles never overlap
        if token.sleep(interval) {
            break;
        }
    }

    if token.is_cancelled() {
        log::info!("Stop requested after {} cycle(s)", cycles);
    }

    // Drop the sender to signal the worker to finish
    drop(sender);

    log::info!("Waiting for incident worker to finish...");
    let worker = worker_handle
        .join()
        .map_err(|e| anyhow!("Incident worker thread panicked: {:?}", e))?;

    log::info!("All processing complete");
    Ok(RunSummary { cycles, worker })
}
