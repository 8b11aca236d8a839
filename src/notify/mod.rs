//! Alert delivery for newly seen incidents.

pub mod telegram;

pub use telegram::TelegramNotifier;

use anyhow::Result;

use crate::wms::IncidentInfo;

/// Delivers an alert for one new incident.
pub trait Notifier: Send {
    fn notify(&self, info: &IncidentInfo) -> Result<()>;
}

/// Fallback used when no delivery channel is configured: alerts only go to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, info: &IncidentInfo) -> Result<()> {
        log::info!(
            "New incident {}: {} ({}, {}), {} related calls",
            info.case_folder_id,
            info.description,
            info.city,
            info.address,
            info.calls
        );
        Ok(())
    }
}
