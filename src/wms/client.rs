use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use reqwest::blocking::{Client, Response};
use std::time::Duration;

use super::feature_info::{parse_feature_info, IncidentInfo};
use super::{IncidentEnricher, TileProvider};
use crate::detection::GeoBoundingBox;
use crate::monitor::config::WmsConfig;

/// Blocking client for the map service's GetMap and GetFeatureInfo requests.
#[derive(Clone)]
pub struct WmsClient {
    client: Client,
    config: WmsConfig,
}

impl WmsClient {
    pub fn new(config: WmsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("incident-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    /// Query parameters of a GetMap request.
    pub fn get_map_params(
        &self,
        bbox: &GeoBoundingBox,
        width: u32,
        height: u32,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("SERVICE", "WMS".to_string()),
            ("VERSION", "1.1.1".to_string()),
            ("REQUEST", "GetMap".to_string()),
            ("FORMAT", "image/png".to_string()),
            ("TRANSPARENT", "true".to_string()),
            ("LAYERS", self.config.layer.clone()),
            ("SRS", self.config.srs.clone()),
            ("EXCEPTIONS", "application/vnd.ogc.se_inimage".to_string()),
            ("TILED", "false".to_string()),
            ("STYLES", String::new()),
            ("WIDTH", width.to_string()),
            ("HEIGHT", height.to_string()),
            ("BBOX", bbox.to_wms_param()),
        ]
    }

    /// Query parameters of a GetFeatureInfo request at the center of `bbox`.
    pub fn feature_info_params(&self, bbox: &GeoBoundingBox) -> Vec<(&'static str, String)> {
        let size = self.config.feature_info_size;
        vec![
            ("SERVICE", "WMS".to_string()),
            ("VERSION", "1.1.1".to_string()),
            ("REQUEST", "GetFeatureInfo".to_string()),
            ("LAYERS", self.config.layer.clone()),
            ("QUERY_LAYERS", self.config.layer.clone()),
            ("STYLES", String::new()),
            ("BBOX", bbox.to_wms_param()),
            ("SRS", self.config.srs.clone()),
            ("WIDTH", size.to_string()),
            ("HEIGHT", size.to_string()),
            ("X", (size / 2).to_string()),
            ("Y", (size / 2).to_string()),
            ("INFO_FORMAT", "text/plain".to_string()),
        ]
    }

    fn get(&self, params: &[(&'static str, String)], what: &str) -> Result<Response> {
        let response = self
            .client
            .get(&self.config.url)
            .query(params)
            .send()
            .with_context(|| format!("{} request failed", what))?;

        if !response.status().is_success() {
            return Err(anyhow!("{} failed: HTTP {}", what, response.status()));
        }
        Ok(response)
    }
}

impl TileProvider for WmsClient {
    fn fetch_tile(&self, bbox: &GeoBoundingBox, width: u32, height: u32) -> Result<RgbImage> {
        let response = self.get(&self.get_map_params(bbox, width, height), "GetMap")?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let bytes = response.bytes().context("Failed to read GetMap body")?;

        if bytes.is_empty() {
            return Err(anyhow!("GetMap returned an empty body"));
        }
        if content_type.starts_with("text/") || content_type.contains("xml") {
            let snippet: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
            return Err(anyhow!("GetMap returned {}: {}", content_type, snippet));
        }

        log::debug!("GetMap {} returned {} bytes", bbox, bytes.len());
        decode_tile(&bytes, width, height)
    }
}

impl IncidentEnricher for WmsClient {
    fn enrich(&self, footprint: &GeoBoundingBox) -> Result<IncidentInfo> {
        let response = self.get(&self.feature_info_params(footprint), "GetFeatureInfo")?;
        let text = response.text().context("Failed to read GetFeatureInfo body")?;

        log::debug!("GetFeatureInfo {}:\n{}", footprint, text.trim_end());
        parse_feature_info(&text)
    }
}

/// Decodes an encoded tile in memory and checks it has the requested size.
pub fn decode_tile(bytes: &[u8], width: u32, height: u32) -> Result<RgbImage> {
    let raster = image::load_from_memory(bytes)
        .context("Failed to decode tile image")?
        .to_rgb8();

    if raster.dimensions() != (width, height) {
        return Err(anyhow!(
            "Tile is {}x{}, requested {}x{}",
            raster.width(),
            raster.height(),
            width,
            height
        ));
    }
    Ok(raster)
}
