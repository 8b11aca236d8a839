//! Pixel to map coordinate conversion.
//!
//! Converts marker circles found in a rendered tile into footprints expressed
//! in the tile's projected coordinate system.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::DetectError;
use super::shapes::PixelCircle;

/// An axis-aligned box in a projected CRS: `(min_x, min_y, max_x, max_y)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoBoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl GeoBoundingBox {
    /// Creates a box, rejecting empty or inverted extents.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, DetectError> {
        let bbox = Self {
            min_x,
            min_y,
            max_x,
            max_y,
        };
        if bbox.is_valid() {
            Ok(bbox)
        } else {
            Err(DetectError::InvalidBoundingBox(bbox))
        }
    }

    /// True when both axes are finite and strictly increasing.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    /// Formats the box as a WMS `BBOX` parameter value.
    pub fn to_wms_param(&self) -> String {
        format!("{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

impl fmt::Display for GeoBoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// A point in the same projected CRS as [`GeoBoundingBox`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

/// Maps pixel positions of one rendered tile into map coordinates.
///
/// Pixel row 0 is the top of the image while map Y grows upward, so the
/// vertical axis is flipped.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateMapper {
    bbox: GeoBoundingBox,
    x_res: f64,
    y_res: f64,
}

impl CoordinateMapper {
    /// Builds a mapper for a `width` x `height` tile rendered for `bbox`.
    ///
    /// Fails with [`DetectError::InvalidDimensions`] if either dimension is zero.
    pub fn new(width: u32, height: u32, bbox: GeoBoundingBox) -> Result<Self, DetectError> {
        if width == 0 || height == 0 {
            return Err(DetectError::InvalidDimensions { width, height });
        }
        if !bbox.is_valid() {
            return Err(DetectError::InvalidBoundingBox(bbox));
        }

        Ok(Self {
            bbox,
            x_res: bbox.width() / width as f64,
            y_res: bbox.height() / height as f64,
        })
    }

    /// Map units per pixel along X and Y.
    pub fn resolution(&self) -> (f64, f64) {
        (self.x_res, self.y_res)
    }

    /// Map position of a pixel coordinate.
    pub fn to_geo(&self, px: f64, py: f64) -> GeoPoint {
        GeoPoint {
            x: self.bbox.min_x + px * self.x_res,
            y: self.bbox.max_y - py * self.y_res,
        }
    }

    /// Map center and footprint of a marker circle.
    ///
    /// The footprint is only a valid box when the radius is positive.
    pub fn footprint(&self, circle: &PixelCircle) -> (GeoPoint, GeoBoundingBox) {
        let center = self.to_geo(circle.x as f64, circle.y as f64);
        let r_geo_x = circle.radius as f64 * self.x_res;
        let r_geo_y = circle.radius as f64 * self.y_res;

        let footprint = GeoBoundingBox {
            min_x: center.x - r_geo_x,
            min_y: center.y - r_geo_y,
            max_x: center.x + r_geo_x,
            max_y: center.y + r_geo_y,
        };
        (center, footprint)
    }
}
