//! Shape filtering of segmented marker regions.
//!
//! Each external region of the mask is traced, fitted with its minimal
//! enclosing circle and scored by circularity (`4π·area / perimeter²`, 1.0
//! for a perfect circle). Markers are raster icons, so the accepted band is
//! loose.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{arc_length, convex_hull};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// A detected marker in pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PixelCircle {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

/// Open interval of accepted circularity scores.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircularityBand {
    pub min: f64,
    pub max: f64,
}

impl Default for CircularityBand {
    fn default() -> Self {
        Self { min: 0.6, max: 1.4 }
    }
}

impl CircularityBand {
    pub fn accepts(&self, circularity: f64) -> bool {
        self.min < circularity && circularity < self.max
    }
}

/// Measurements of one traced region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionShape {
    pub center: (f64, f64),
    pub radius: f64,
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
}

impl RegionShape {
    /// Truncates the enclosing circle to whole pixels.
    pub fn to_pixel_circle(&self) -> PixelCircle {
        PixelCircle {
            x: self.center.0 as u32,
            y: self.center.1 as u32,
            radius: self.radius as u32,
        }
    }
}

/// Returns the circles of all external mask regions inside `band`.
///
/// Regions with zero area are skipped before scoring. No ordering is
/// guaranteed between the returned circles.
pub fn extract_circles(mask: &GrayImage, band: &CircularityBand) -> Vec<PixelCircle> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| measure_region(&c.points))
        .filter(|shape| {
            let keep = band.accepts(shape.circularity);
            log::trace!(
                "Region at ({:.1}, {:.1}) r={:.1}: circularity {:.3} {}",
                shape.center.0,
                shape.center.1,
                shape.radius,
                shape.circularity,
                if keep { "kept" } else { "rejected" }
            );
            keep
        })
        .map(|shape| shape.to_pixel_circle())
        .collect()
}

/// Measures a closed boundary. Returns `None` for zero-area regions.
pub fn measure_region(boundary: &[Point<i32>]) -> Option<RegionShape> {
    let area = polygon_area(boundary);
    if area <= 0.0 {
        return None;
    }

    let perimeter = arc_length(boundary, true);
    let (center, radius) = min_enclosing_circle(boundary)?;

    Some(RegionShape {
        center,
        radius,
        area,
        perimeter,
        circularity: 4.0 * std::f64::consts::PI * area / (perimeter * perimeter),
    })
}

/// Absolute shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let mut twice_area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice_area += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    twice_area.abs() / 2.0
}

type Circle = ((f64, f64), f64);

/// Smallest circle containing every point.
///
/// Runs the incremental Welzl construction over the convex hull, which has
/// the same enclosing circle and far fewer points than a traced boundary.
pub fn min_enclosing_circle(points: &[Point<i32>]) -> Option<Circle> {
    let hull: Vec<(f64, f64)> = convex_hull(points)
        .into_iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect();

    let first = *hull.first()?;
    let mut circle: Circle = (first, 0.0);

    for i in 1..hull.len() {
        if inside(&circle, hull[i]) {
            continue;
        }
        circle = (hull[i], 0.0);
        for j in 0..i {
            if inside(&circle, hull[j]) {
                continue;
            }
            circle = circle_from_two(hull[i], hull[j]);
            for k in 0..j {
                if !inside(&circle, hull[k]) {
                    circle = circle_from_three(hull[i], hull[j], hull[k]);
                }
            }
        }
    }

    Some(circle)
}

fn inside(circle: &Circle, p: (f64, f64)) -> bool {
    let ((cx, cy), r) = *circle;
    (p.0 - cx).hypot(p.1 - cy) <= r * (1.0 + 1e-9) + 1e-9
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> Circle {
    let center = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    (center, (a.0 - b.0).hypot(a.1 - b.1) / 2.0)
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Circle {
    let (bx, by) = (b.0 - a.0, b.1 - a.1);
    let (cx, cy) = (c.0 - a.0, c.1 - a.1);
    let d = 2.0 * (bx * cy - by * cx);

    if d.abs() < 1e-12 {
        // Collinear: the widest pair spans the circle
        return [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)]
            .into_iter()
            .fold((a, 0.0), |best, cand| if cand.1 > best.1 { cand } else { best });
    }

    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;

    ((a.0 + ux, a.1 + uy), ux.hypot(uy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    fn mask_with_rect(x: i32, y: i32, w: u32, h: u32) -> GrayImage {
        let mut mask = GrayImage::new(300, 300);
        draw_filled_rect_mut(&mut mask, Rect::at(x, y).of_size(w, h), Luma([255]));
        mask
    }

    #[test]
    fn test_square_is_accepted() {
        let mask = mask_with_rect(100, 100, 40, 40);
        let circles = extract_circles(&mask, &CircularityBand::default());

        assert_eq!(circles.len(), 1);
        // Enclosing circle of the 40x40 block: center 119.5, radius 19.5·√2
        assert_eq!(circles[0], PixelCircle { x: 119, y: 119, radius: 27 });
    }

    #[test]
    fn test_square_circularity_is_quarter_pi() {
        let mask = mask_with_rect(10, 10, 30, 30);
        let contours = find_contours::<i32>(&mask);
        let shape = measure_region(&contours[0].points).unwrap();

        assert!((shape.circularity - std::f64::consts::FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn test_elongated_rectangle_is_rejected() {
        let mask = mask_with_rect(50, 50, 100, 4);
        assert!(extract_circles(&mask, &CircularityBand::default()).is_empty());
    }

    #[test]
    fn test_disk_is_accepted() {
        let mut mask = GrayImage::new(400, 300);
        draw_filled_circle_mut(&mut mask, (200, 150), 20, Luma([255]));

        let circles = extract_circles(&mask, &CircularityBand::default());

        assert_eq!(circles.len(), 1);
        let c = circles[0];
        assert!(c.x.abs_diff(200) <= 1, "center x = {}", c.x);
        assert!(c.y.abs_diff(150) <= 1, "center y = {}", c.y);
        assert!((19..=21).contains(&c.radius), "radius = {}", c.radius);
    }

    #[test]
    fn test_zero_area_regions_are_discarded() {
        let mut mask = GrayImage::new(50, 50);
        mask.put_pixel(10, 10, Luma([255]));
        draw_filled_rect_mut(&mut mask, Rect::at(20, 30).of_size(15, 1), Luma([255]));

        assert!(extract_circles(&mask, &CircularityBand::default()).is_empty());
    }

    #[test]
    fn test_only_external_regions_are_scored() {
        // A ring with a dot in its hole: the dot is nested and must be ignored
        let mut mask = GrayImage::new(200, 200);
        draw_filled_circle_mut(&mut mask, (100, 100), 40, Luma([255]));
        draw_filled_circle_mut(&mut mask, (100, 100), 25, Luma([0]));
        draw_filled_circle_mut(&mut mask, (100, 100), 8, Luma([255]));

        let circles = extract_circles(&mask, &CircularityBand::default());

        assert_eq!(circles.len(), 1);
        assert!((39..=41).contains(&circles[0].radius));
    }

    #[test]
    fn test_multiple_markers() {
        let mut mask = GrayImage::new(300, 300);
        draw_filled_circle_mut(&mut mask, (50, 50), 10, Luma([255]));
        draw_filled_circle_mut(&mut mask, (200, 80), 12, Luma([255]));
        draw_filled_circle_mut(&mut mask, (120, 250), 9, Luma([255]));

        let circles = extract_circles(&mask, &CircularityBand::default());
        assert_eq!(circles.len(), 3);
    }

    #[test]
    fn test_min_enclosing_circle_triangle() {
        let points = [Point::new(0, 0), Point::new(4, 0), Point::new(0, 3)];
        let ((cx, cy), r) = min_enclosing_circle(&points).unwrap();

        assert!((cx - 2.0).abs() < 1e-9);
        assert!((cy - 1.5).abs() < 1e-9);
        assert!((r - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_min_enclosing_circle_empty() {
        assert!(min_enclosing_circle(&[]).is_none());
    }

    #[test]
    fn test_polygon_area() {
        let square = [Point::new(0, 0), Point::new(3, 0), Point::new(3, 3), Point::new(0, 3)];
        assert_eq!(polygon_area(&square), 9.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }
}
