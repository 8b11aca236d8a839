//! Map service access.
//!
//! This module provides:
//! - Tile rendering requests (GetMap) decoded into RGB rasters
//! - Incident attribute lookups (GetFeatureInfo) for a detected footprint

pub mod client;
pub mod feature_info;

pub use client::WmsClient;
pub use feature_info::IncidentInfo;

use anyhow::Result;
use image::RgbImage;

use crate::detection::GeoBoundingBox;

/// Source of rendered map tiles.
pub trait TileProvider: Send + Sync {
    /// Fetches and decodes a `width` x `height` tile covering `bbox`.
    fn fetch_tile(&self, bbox: &GeoBoundingBox, width: u32, height: u32) -> Result<RgbImage>;
}

/// Looks up the attributes of the incident drawn inside a footprint.
pub trait IncidentEnricher: Send {
    fn enrich(&self, footprint: &GeoBoundingBox) -> Result<IncidentInfo>;
}
