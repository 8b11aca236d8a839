//! Configuration types for the monitor.
//!
//! Loads settings from config.json at startup. Provides the map service
//! endpoint, query regions, detection thresholds and polling timing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::detection::{FingerprintGenerator, GeoBoundingBox, MarkerConfig};

/// Map service (WMS) settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WmsConfig {
    /// Endpoint for GetMap and GetFeatureInfo requests
    pub url: String,
    /// Layer that renders active incidents
    pub layer: String,
    /// Projected CRS of every bounding box
    pub srs: String,
    /// Tile width in pixels
    pub tile_width: u32,
    /// Tile height in pixels
    pub tile_height: u32,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// Pixel size of the GetFeatureInfo query window
    pub feature_info_size: u32,
}

impl Default for WmsConfig {
    fn default() -> Self {
        Self {
            url: "https://www.112cv.gva.es/geoserver/cv112/wms".to_string(),
            layer: "gis112cv:V_INCIDENTES_CURSO".to_string(),
            srs: "EPSG:3857".to_string(),
            tile_width: 1024,
            tile_height: 1024,
            timeout_secs: 10,
            feature_info_size: 256,
        }
    }
}

/// A named bounding box scanned on every cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRegion {
    pub name: String,
    pub bbox: GeoBoundingBox,
}

/// Telegram delivery settings. Credentials may come from the environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Environment variable overriding [`TelegramConfig::bot_token`].
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable overriding [`TelegramConfig::chat_id`].
pub const TELEGRAM_CHAT_ENV: &str = "TELEGRAM_CHAT_ID";

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            bot_token: None,
            chat_id: None,
        }
    }
}

impl TelegramConfig {
    /// Returns (token, chat id) with environment values taking precedence.
    ///
    /// `None` when either is missing or blank.
    pub fn credentials(&self) -> Option<(String, String)> {
        self.resolve_credentials(
            std::env::var(TELEGRAM_TOKEN_ENV).ok(),
            std::env::var(TELEGRAM_CHAT_ENV).ok(),
        )
    }

    /// Combines environment values (which win) with the configured ones.
    pub fn resolve_credentials(
        &self,
        env_token: Option<String>,
        env_chat_id: Option<String>,
    ) -> Option<(String, String)> {
        let pick = |from_env: Option<String>, configured: &Option<String>| {
            from_env
                .or_else(|| configured.clone())
                .filter(|v| !v.trim().is_empty())
        };
        let token = pick(env_token, &self.bot_token)?;
        let chat_id = pick(env_chat_id, &self.chat_id)?;
        Some((token, chat_id))
    }
}

/// Complete monitor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub wms: WmsConfig,
    /// Regions scanned each cycle
    #[serde(default = "default_regions")]
    pub regions: Vec<QueryRegion>,
    /// Pause between the end of one cycle and the start of the next (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Marker color, circularity band and fingerprint grid
    #[serde(default)]
    pub marker: MarkerConfig,
    /// Incident ledger location (defaults to the user data dir)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// When set, intermediate detection frames are saved here
    #[serde(default)]
    pub debug_frames_dir: Option<PathBuf>,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_regions() -> Vec<QueryRegion> {
    vec![
        QueryRegion {
            name: "Xàtiva".to_string(),
            bbox: GeoBoundingBox {
                min_x: -81954.0082793884,
                min_y: 4696976.047300361,
                max_x: -32613.90652130714,
                max_y: 4737029.0501217935,
            },
        },
        QueryRegion {
            name: "Enguera".to_string(),
            bbox: GeoBoundingBox {
                min_x: -120349.2871603583,
                min_y: 4691880.838453397,
                max_x: -71009.18540227704,
                max_y: 4731933.84127483,
            },
        },
    ]
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            wms: WmsConfig::default(),
            regions: default_regions(),
            poll_interval_secs: default_poll_interval_secs(),
            marker: MarkerConfig::default(),
            store_path: None,
            telegram: TelegramConfig::default(),
            debug_frames_dir: None,
        }
    }
}

impl MonitorConfig {
    /// Drops regions with an invalid bounding box, logging each one, and
    /// resets unusable tile sizes and fingerprint grids.
    pub fn validated(mut self) -> Self {
        self.regions.retain(|region| {
            let ok = region.bbox.is_valid();
            if !ok {
                log::warn!(
                    "Ignoring region '{}': invalid bounding box {}",
                    region.name,
                    region.bbox
                );
            }
            ok
        });
        let grid = self.marker.fingerprint.grid;
        if !grid.is_finite() || grid < 0.0 {
            log::warn!("Invalid fingerprint grid {}, using 1.0", grid);
            self.marker.fingerprint = FingerprintGenerator::new(1.0);
        }
        if self.wms.tile_width == 0 || self.wms.tile_height == 0 {
            log::warn!(
                "Invalid tile size {}x{}, using defaults",
                self.wms.tile_width,
                self.wms.tile_height
            );
            self.wms.tile_width = WmsConfig::default().tile_width;
            self.wms.tile_height = WmsConfig::default().tile_height;
        }
        self
    }

    /// Ledger path, falling back to the user data dir.
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(crate::paths::get_default_store_path)
    }
}

/// Loads configuration from `config_path` or returns defaults.
///
/// A missing or unreadable file is not fatal: the problem is logged and the
/// defaults are used.
pub fn load_config(config_path: &Path) -> MonitorConfig {
    log::info!("Looking for config at: {}", config_path.display());

    let config = if config_path.exists() {
        match fs::read_to_string(config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Config loaded from {}", config_path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", config_path.display(), e);
                    MonitorConfig::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", config_path.display(), e);
                MonitorConfig::default()
            }
        }
    } else {
        log::info!("{} not found. Using default config.", config_path.display());
        MonitorConfig::default()
    };

    config.validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("config.json"));

        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.wms.tile_width, 1024);
        assert_eq!(config.marker.hsv.upper, [20, 255, 255]);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "poll_interval_secs": 30,
                "wms": { "tile_width": 512 },
                "marker": { "circularity": { "min": 0.7, "max": 1.3 } },
                "regions": [
                    { "name": "test", "bbox": { "min_x": 0, "min_y": 0, "max_x": 10, "max_y": 10 } }
                ]
            }"#,
        )
        .unwrap();

        let config = load_config(&path);

        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.wms.tile_width, 512);
        assert_eq!(config.wms.tile_height, 1024);
        assert_eq!(config.marker.circularity.min, 0.7);
        assert_eq!(config.marker.fingerprint.grid, 1.0);
        assert_eq!(config.regions.len(), 1);
        assert_eq!(config.telegram.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config(&path);
        assert_eq!(config.regions, default_regions());
    }

    #[test]
    fn test_invalid_regions_are_dropped() {
        let mut config = MonitorConfig::default();
        config.regions.push(QueryRegion {
            name: "inverted".to_string(),
            bbox: GeoBoundingBox { min_x: 10.0, min_y: 0.0, max_x: 0.0, max_y: 10.0 },
        });
        config.wms.tile_height = 0;

        let config = config.validated();

        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.wms.tile_height, 1024);
    }

    #[test]
    fn test_default_regions_are_valid() {
        assert!(default_regions().iter().all(|r| r.bbox.is_valid()));
    }

    fn telegram(token: Option<&str>, chat_id: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            api_base: default_telegram_api_base(),
            bot_token: token.map(str::to_string),
            chat_id: chat_id.map(str::to_string),
        }
    }

    #[test]
    fn test_credentials_require_both_values() {
        assert!(telegram(Some("   "), Some("42")).resolve_credentials(None, None).is_none());
        assert!(telegram(Some("123:abc"), None).resolve_credentials(None, None).is_none());
        assert!(telegram(None, None).resolve_credentials(None, None).is_none());
        assert_eq!(
            telegram(Some("123:abc"), Some("42")).resolve_credentials(None, None),
            Some(("123:abc".to_string(), "42".to_string()))
        );
    }

    #[test]
    fn test_environment_credentials_take_precedence() {
        let config = telegram(Some("123:abc"), Some("42"));

        assert_eq!(
            config.resolve_credentials(Some("999:env".to_string()), None),
            Some(("999:env".to_string(), "42".to_string()))
        );
        assert_eq!(
            telegram(None, None)
                .resolve_credentials(Some("999:env".to_string()), Some("-100".to_string())),
            Some(("999:env".to_string(), "-100".to_string()))
        );
        // A blank environment value does not fall back to the file
        assert!(config.resolve_credentials(Some(String::new()), None).is_none());
    }

    #[test]
    fn test_invalid_fingerprint_grid_is_reset() {
        let mut config = MonitorConfig::default();
        config.marker.fingerprint.grid = f64::NAN;
        assert_eq!(config.validated().marker.fingerprint.grid, 1.0);

        let mut config = MonitorConfig::default();
        config.marker.fingerprint.grid = 0.5;
        assert_eq!(config.validated().marker.fingerprint.grid, 0.5);
    }
}
