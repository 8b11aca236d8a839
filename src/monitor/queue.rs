//! Work queue between the polling loop and the incident worker.
//!
//! The polling thread sends merged detections, the incident worker receives
//! and processes them.

use chrono::{DateTime, Local};
use std::sync::mpsc::{channel, Receiver, Sender};

use crate::detection::Detection;

/// A newly detected marker waiting to be checked, enriched and announced.
#[derive(Debug, Clone)]
pub struct IncidentWorkItem {
    /// Name of the query region the marker was first seen in
    pub region: String,
    pub detection: Detection,
    /// Polling cycle number (1-based)
    pub cycle: u64,
    /// Timestamp when the tile was processed
    pub detected_at: DateTime<Local>,
}

impl IncidentWorkItem {
    pub fn new(region: String, detection: Detection, cycle: u64) -> Self {
        Self {
            region,
            detection,
            cycle,
            detected_at: Local::now(),
        }
    }
}

/// Creates a new work queue.
///
/// The channel is unbounded: items queue up if enrichment is slower than
/// polling.
pub fn create_work_queue() -> (Sender<IncidentWorkItem>, Receiver<IncidentWorkItem>) {
    channel()
}
