//! Incident worker thread.
//!
//! Runs in a separate thread, receiving detections from the work queue.
//! Each unknown incident is enriched from the map service, recorded in the
//! store and announced.

use anyhow::Result;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::monitor::queue::IncidentWorkItem;
use crate::monitor::store::{IncidentRecord, IncidentStore};
use crate::notify::Notifier;
use crate::wms::IncidentEnricher;

/// What happened to one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The fingerprint was already in the store
    AlreadyKnown,
    /// Recorded and announced
    Announced,
    /// Recorded but the alert could not be delivered
    RecordedNotAnnounced,
    /// Another insert with the same fingerprint won
    LostRace,
}

/// Counters reported when the worker exits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u32,
    pub already_known: u32,
    pub announced: u32,
    pub failed: u32,
}

/// Owns the collaborators that act on new incidents.
pub struct IncidentWorker {
    enricher: Box<dyn IncidentEnricher>,
    notifier: Box<dyn Notifier>,
    store: Arc<dyn IncidentStore>,
}

impl IncidentWorker {
    pub fn new(
        enricher: Box<dyn IncidentEnricher>,
        notifier: Box<dyn Notifier>,
        store: Arc<dyn IncidentStore>,
    ) -> Self {
        Self {
            enricher,
            notifier,
            store,
        }
    }

    /// Handles one detection.
    ///
    /// The record is stored before the alert goes out, so a delivery failure
    /// never causes the same incident to be announced twice.
    pub fn process(&self, item: &IncidentWorkItem) -> Result<Outcome> {
        let fingerprint = &item.detection.fingerprint;

        if self.store.contains(fingerprint) {
            log::info!("Incident {} already exists. Skipping.", fingerprint);
            return Ok(Outcome::AlreadyKnown);
        }

        let info = self.enricher.enrich(&item.detection.footprint)?;

        let record = IncidentRecord {
            fingerprint: fingerprint.clone(),
            first_seen: item.detected_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            region: item.region.clone(),
            case_folder_id: info.case_folder_id,
            city: info.city.clone(),
            address: info.address.clone(),
            description: info.description.clone(),
            calls: info.calls,
            footprint: item.detection.footprint,
        };

        if !self.store.insert_if_absent(&record)? {
            log::info!("Incident {} was recorded concurrently. Skipping.", fingerprint);
            return Ok(Outcome::LostRace);
        }
        let center = item.detection.footprint.center();
        log::info!(
            "Incident {} (case {}, {}) at ({:.1}, {:.1}) added to the store",
            fingerprint,
            info.case_folder_id,
            info.city,
            center.x,
            center.y
        );

        match self.notifier.notify(&info) {
            Ok(()) => Ok(Outcome::Announced),
            Err(e) => {
                log::error!("Failed to announce incident {}: {:#}", fingerprint, e);
                Ok(Outcome::RecordedNotAnnounced)
            }
        }
    }

    /// Processes items until the channel is closed (sender dropped).
    ///
    /// Blocks, so it should be run in a dedicated thread.
    pub fn run(self, receiver: Receiver<IncidentWorkItem>) -> WorkerStats {
        log::debug!("Incident worker started");
        let mut stats = WorkerStats::default();

        while let Ok(item) = receiver.recv() {
            stats.processed += 1;
            match self.process(&item) {
                Ok(Outcome::AlreadyKnown) | Ok(Outcome::LostRace) => stats.already_known += 1,
                Ok(Outcome::Announced) => stats.announced += 1,
                Ok(Outcome::RecordedNotAnnounced) => stats.failed += 1,
                Err(e) => {
                    // Not recorded, so the next cycle retries it
                    log::error!(
                        "Incident {} from {} (cycle {}) failed: {:#}",
                        item.detection.fingerprint,
                        item.region,
                        item.cycle,
                        e
                    );
                    stats.failed += 1;
                }
            }
        }

        log::debug!("Incident worker finished: {:?}", stats);
        stats
    }
}
