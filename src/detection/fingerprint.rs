//! Stable identities for detected markers.
//!
//! The same incident is seen again on every polling cycle, so its identity
//! must only depend on where it is. Centers are snapped to a grid, formatted
//! with a fixed precision and hashed with SHA-256.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::geo::GeoPoint;

/// Derives fingerprints from marker centers.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintGenerator {
    /// Grid step in map units centers are rounded to before hashing.
    pub grid: f64,
}

impl Default for FingerprintGenerator {
    /// One map unit, which is one meter for EPSG:3857 tiles.
    fn default() -> Self {
        Self { grid: 1.0 }
    }
}

impl FingerprintGenerator {
    pub fn new(grid: f64) -> Self {
        Self { grid }
    }

    /// Canonical text for a center. Non-positive grids disable snapping.
    pub fn canonical_text(&self, center: GeoPoint) -> String {
        let snap = |v: f64| {
            let snapped = if self.grid > 0.0 {
                (v / self.grid).round() * self.grid
            } else {
                v
            };
            // Adding zero folds -0.0 into 0.0 so both format the same
            snapped + 0.0
        };
        format!("X:{:.3}, Y:{:.3}", snap(center.x), snap(center.y))
    }

    /// Fixed-length lowercase hex identity of a center.
    pub fn fingerprint(&self, center: GeoPoint) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_text(center).as_bytes());
        hex::encode(hasher.finalize())
    }
}
