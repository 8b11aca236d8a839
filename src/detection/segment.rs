//! Color segmentation of marker icons.
//!
//! Rendered incident icons are antialiased, so a plain RGB threshold misses
//! their edges. Pixels are converted to 8-bit HSV (hue 0-179, saturation and
//! value 0-255) and kept when all three channels fall inside a range.

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Mask value for pixels inside the target range.
pub const MASK_SET: u8 = 255;

/// Inclusive HSV bounds, in 8-bit half-degree hue convention.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl Default for HsvRange {
    /// Orange incident markers.
    fn default() -> Self {
        Self {
            lower: [0, 100, 100],
            upper: [20, 255, 255],
        }
    }
}

impl HsvRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }
}

/// Converts one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);

    let s = if v > 0.0 { diff * 255.0 / v } else { 0.0 };

    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    // 359.x degrees rounds up to 180, which is the same hue as 0
    let h = (h / 2.0).round() as u32 % 180;

    [h as u8, s.round() as u8, v as u8]
}

/// Builds a binary mask of pixels whose HSV value lies within `range`.
///
/// Set pixels are [`MASK_SET`], everything else 0. The mask has the raster's
/// dimensions; a zero-sized raster yields a zero-sized mask.
pub fn segment_markers(raster: &RgbImage, range: &HsvRange) -> GrayImage {
    let (width, height) = raster.dimensions();
    let mut mask = GrayImage::new(width, height);

    for (x, y, pixel) in raster.enumerate_pixels() {
        let hsv = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        if range.contains(hsv) {
            mask.put_pixel(x, y, Luma([MASK_SET]));
        }
    }

    mask
}
