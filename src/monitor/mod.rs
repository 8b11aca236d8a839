//! Incident polling service.
//!
//! This module provides:
//! - Configuration loading (config.json)
//! - The polling loop over the configured regions
//! - A work queue feeding the incident worker thread
//! - The incident ledger used to announce each incident once

pub mod config;
pub mod queue;
pub mod runner;
pub mod store;
pub mod worker;

pub use config::{load_config, MonitorConfig};
pub use runner::{run_monitor, CancelToken, RunMode};
pub use store::JsonlIncidentStore;
pub use worker::IncidentWorker;

use crate::detection::{FrameDumper, MarkerDetector};

/// Builds the detector for `config`, saving intermediate frames when a
/// debug directory is configured.
pub fn build_detector(config: &MonitorConfig) -> MarkerDetector {
    let detector = MarkerDetector::new(config.marker.clone());
    log::debug!(
        "Marker HSV range {:?}..={:?}, circularity ({}, {})",
        detector.config().hsv.lower,
        detector.config().hsv.upper,
        detector.config().circularity.min,
        detector.config().circularity.max
    );
    match &config.debug_frames_dir {
        Some(dir) => {
            log::info!("Saving debug frames to {}", dir.display());
            detector.with_frame_hook(FrameDumper::new(dir.clone()).into_hook())
        }
        None => detector,
    }
}
