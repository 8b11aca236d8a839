//! Incident marker detection on rendered map tiles.
//!
//! This module provides:
//! - HSV color segmentation of marker icons
//! - External region tracing with circularity filtering
//! - Pixel to map coordinate conversion
//! - Grid-snapped SHA-256 fingerprints for deduplication
//!
//! Everything here is pure computation on an in-memory raster. Fetching
//! tiles, storing incidents and sending alerts live elsewhere.

pub mod debug;
pub mod error;
pub mod fingerprint;
pub mod geo;
pub mod segment;
pub mod shapes;

pub use debug::{DebugFrame, FrameDumper, FrameHook};
pub use error::DetectError;
pub use fingerprint::FingerprintGenerator;
pub use geo::{CoordinateMapper, GeoBoundingBox};
pub use segment::{segment_markers, HsvRange};
pub use shapes::{extract_circles, CircularityBand, PixelCircle};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One accepted marker.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub fingerprint: String,
    pub footprint: GeoBoundingBox,
}

/// Detections from one tile. May be empty.
pub type DetectionBatch = Vec<Detection>;

/// Tunable detection parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// HSV range of the marker fill color
    pub hsv: HsvRange,
    /// Accepted circularity band (exclusive bounds)
    pub circularity: CircularityBand,
    /// Center snapping used for fingerprints
    pub fingerprint: FingerprintGenerator,
}

/// Runs segmentation, shape filtering, mapping and fingerprinting on a tile.
///
/// Holds no per-call state, so one detector can serve many threads as long
/// as each call brings its own raster.
#[derive(Clone, Default)]
pub struct MarkerDetector {
    config: MarkerConfig,
    on_intermediate_frame: Option<FrameHook>,
}

impl MarkerDetector {
    pub fn new(config: MarkerConfig) -> Self {
        Self {
            config,
            on_intermediate_frame: None,
        }
    }

    /// Installs a callback that receives the raster, mask and annotated frames.
    pub fn with_frame_hook(mut self, hook: FrameHook) -> Self {
        self.on_intermediate_frame = Some(hook);
        self
    }

    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// Detects markers in a `width` x `height` raster rendered for `bbox`.
    ///
    /// Returns an empty batch when nothing matches. Fails without partial
    /// output if the dimensions are zero, disagree with the raster, or the
    /// box is invalid.
    pub fn detect(
        &self,
        raster: &RgbImage,
        width: u32,
        height: u32,
        bbox: GeoBoundingBox,
    ) -> Result<DetectionBatch, DetectError> {
        if width == 0 || height == 0 {
            return Err(DetectError::InvalidDimensions { width, height });
        }
        if raster.dimensions() != (width, height) {
            return Err(DetectError::DimensionMismatch {
                expected: (width, height),
                actual: raster.dimensions(),
            });
        }
        let mapper = CoordinateMapper::new(width, height, bbox)?;
        let (x_res, y_res) = mapper.resolution();
        log::trace!(
            "Detecting in {}x{} raster over {} ({} x {} per pixel)",
            width,
            height,
            bbox,
            x_res,
            y_res
        );

        self.emit(&DebugFrame::Raster(raster));

        let mask = segment_markers(raster, &self.config.hsv);
        self.emit(&DebugFrame::Mask(&mask));

        let circles: Vec<PixelCircle> = extract_circles(&mask, &self.config.circularity)
            .into_iter()
            .filter(|c| c.radius > 0)
            .collect();

        let batch: DetectionBatch = circles
            .iter()
            .map(|circle| {
                let (center, footprint) = mapper.footprint(circle);
                log::debug!(
                    "Marker at pixel ({}, {}) r={} -> ({:.2}, {:.2})",
                    circle.x,
                    circle.y,
                    circle.radius,
                    center.x,
                    center.y
                );
                Detection {
                    fingerprint: self.config.fingerprint.fingerprint(center),
                    footprint,
                }
            })
            .collect();

        if self.on_intermediate_frame.is_some() {
            let annotated = debug::annotate(raster, &circles);
            self.emit(&DebugFrame::Annotated(&annotated));
        }

        Ok(batch)
    }

    /// Same as [`detect`](Self::detect) using the raster's own dimensions.
    pub fn detect_raster(
        &self,
        raster: &RgbImage,
        bbox: GeoBoundingBox,
    ) -> Result<DetectionBatch, DetectError> {
        let (width, height) = raster.dimensions();
        self.detect(raster, width, height, bbox)
    }

    fn emit(&self, frame: &DebugFrame<'_>) {
        if let Some(hook) = &self.on_intermediate_frame {
            hook(frame);
        }
    }
}

/// Unions labelled batches by fingerprint, keeping the first occurrence.
///
/// Tiles that overlap see the same marker at the same map position, which
/// gives the same fingerprint, so it is reported once.
pub fn merge_batches<L: Clone>(
    batches: impl IntoIterator<Item = (L, DetectionBatch)>,
) -> Vec<(L, Detection)> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for (label, batch) in batches {
        for detection in batch {
            if seen.insert(detection.fingerprint.clone()) {
                merged.push((label.clone(), detection));
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;
    use std::sync::{Arc, Mutex};

    const ORANGE: Rgb<u8> = Rgb([255, 128, 0]);
    const BACKGROUND: Rgb<u8> = Rgb([230, 230, 230]);

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, BACKGROUND)
    }

    fn unit_bbox(size: f64) -> GeoBoundingBox {
        GeoBoundingBox::new(0.0, 0.0, size, size).unwrap()
    }

    #[test]
    fn test_background_only_yields_empty_batch() {
        let detector = MarkerDetector::default();
        let batch = detector.detect(&blank(256, 256), 256, 256, unit_bbox(256.0)).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_square_marker_maps_with_vertical_flip() {
        let mut raster = blank(1024, 1024);
        // 41x41 block centered on pixel (512, 256)
        draw_filled_rect_mut(&mut raster, Rect::at(492, 236).of_size(41, 41), ORANGE);

        let batch = MarkerDetector::default()
            .detect(&raster, 1024, 1024, unit_bbox(1024.0))
            .unwrap();

        assert_eq!(batch.len(), 1);
        // Enclosing radius 20·√2 truncates to 28
        assert_eq!(
            batch[0].footprint,
            GeoBoundingBox::new(484.0, 740.0, 540.0, 796.0).unwrap()
        );
    }

    #[test]
    fn test_elongated_shape_is_ignored() {
        let mut raster = blank(300, 300);
        draw_filled_rect_mut(&mut raster, Rect::at(20, 20).of_size(200, 5), ORANGE);
        draw_filled_circle_mut(&mut raster, (150, 200), 15, ORANGE);

        let batch = MarkerDetector::default().detect_raster(&raster, unit_bbox(300.0)).unwrap();

        assert_eq!(batch.len(), 1);
        let center = batch[0].footprint.center();
        assert!((center.x - 150.0).abs() <= 1.0);
        assert!((center.y - 100.0).abs() <= 1.0);
    }

    #[test]
    fn test_zero_radius_candidate_is_discarded() {
        let mut raster = blank(64, 64);
        // Circularity π/4 passes the band, but the enclosing radius √2/2 truncates to 0
        draw_filled_rect_mut(&mut raster, Rect::at(10, 10).of_size(2, 2), ORANGE);

        let mask = segment_markers(&raster, &HsvRange::default());
        let circles = extract_circles(&mask, &CircularityBand::default());
        assert_eq!(circles, vec![PixelCircle { x: 10, y: 10, radius: 0 }]);

        let batch = MarkerDetector::default().detect_raster(&raster, unit_bbox(64.0)).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let mut raster = blank(400, 400);
        draw_filled_circle_mut(&mut raster, (100, 120), 12, ORANGE);
        draw_filled_circle_mut(&mut raster, (300, 310), 9, ORANGE);
        let bbox = GeoBoundingBox::new(-81954.0, 4696976.0, -32613.9, 4737029.0).unwrap();

        let detector = MarkerDetector::default();
        let first = detector.detect(&raster, 400, 400, bbox).unwrap();
        let second = detector.detect(&raster, 400, 400, bbox).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_input_fails_fast() {
        let detector = MarkerDetector::default();

        assert!(matches!(
            detector.detect(&RgbImage::new(0, 0), 0, 0, unit_bbox(1.0)),
            Err(DetectError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            detector.detect(&blank(10, 10), 20, 10, unit_bbox(1.0)),
            Err(DetectError::DimensionMismatch { expected: (20, 10), actual: (10, 10) })
        ));

        let inverted = GeoBoundingBox { min_x: 5.0, min_y: 0.0, max_x: 1.0, max_y: 1.0 };
        assert!(matches!(
            detector.detect(&blank(10, 10), 10, 10, inverted),
            Err(DetectError::InvalidBoundingBox(_))
        ));
    }

    #[test]
    fn test_frame_hook_receives_all_stages() {
        let labels = Arc::new(Mutex::new(Vec::new()));
        let sink = labels.clone();
        let hook: FrameHook = Arc::new(move |frame| {
            sink.lock().unwrap().push(frame.label());
        });

        let mut raster = blank(64, 64);
        draw_filled_circle_mut(&mut raster, (32, 32), 6, ORANGE);

        let batch = MarkerDetector::default()
            .with_frame_hook(hook)
            .detect_raster(&raster, unit_bbox(64.0))
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(*labels.lock().unwrap(), vec!["raster", "mask", "annotated"]);
    }

    #[test]
    fn test_overlapping_regions_merge_by_fingerprint() {
        // Two 200x200 tiles at 1 unit/pixel overlapping by 100 units in X.
        // A marker at map (150, 100) is visible in both.
        let mut west = blank(200, 200);
        draw_filled_circle_mut(&mut west, (150, 100), 10, ORANGE);
        draw_filled_circle_mut(&mut west, (40, 40), 8, ORANGE);
        let mut east = blank(200, 200);
        draw_filled_circle_mut(&mut east, (50, 100), 10, ORANGE);

        let detector = MarkerDetector::default();
        let west_batch = detector
            .detect_raster(&west, GeoBoundingBox::new(0.0, 0.0, 200.0, 200.0).unwrap())
            .unwrap();
        let east_batch = detector
            .detect_raster(&east, GeoBoundingBox::new(100.0, 0.0, 300.0, 200.0).unwrap())
            .unwrap();
        assert_eq!(west_batch.len(), 2);
        assert_eq!(east_batch.len(), 1);

        let merged = merge_batches([("west", west_batch), ("east", east_batch)]);

        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|(label, _)| *label == "west"));
    }
}
