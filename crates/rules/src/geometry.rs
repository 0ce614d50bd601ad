//! Pure geometry used by the rule variants.
//!
//! Everything here is pixel-space unless stated otherwise. Out-of-range
//! results are expressed as `f64::INFINITY` / `false` so that any downstream
//! threshold comparison fails closed.

use std::f64::consts::FRAC_PI_2;

use safevision_core::{GlobalConfig, Point};

/// Minimum ground depth returned for rays that hit the ground very close to the camera.
const MIN_GROUND_DEPTH: f64 = 0.1;

// ── Planar tests ─────────────────────────────────────────────────────

/// Even-odd ray casting. Polygons with fewer than three vertices contain nothing.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let (x, y) = point;
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) {
            let x_cross = (xj - xi) * (y - yi) / (yj - yi) + xi;
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn ccw(a: Point, b: Point, c: Point) -> bool {
    (c.1 - a.1) * (b.0 - a.0) > (b.1 - a.1) * (c.0 - a.0)
}

/// Whether the movement `prev -> curr` properly crosses the segment `line_a -> line_b`.
///
/// Collinear overlap and touching endpoints are not crossings.
pub fn segment_crossed(line_a: Point, line_b: Point, prev: Point, curr: Point) -> bool {
    ccw(prev, line_a, line_b) != ccw(curr, line_a, line_b)
        && ccw(prev, curr, line_a) != ccw(prev, curr, line_b)
}

pub fn pixel_distance(a: Point, b: Point) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Flat-ground approximation: pixel distance scaled by a constant factor.
pub fn meter_distance(a: Point, b: Point, pixel_to_meter: f64) -> f64 {
    pixel_distance(a, b) * pixel_to_meter
}

// ── Perspective model ────────────────────────────────────────────────

/// Pinhole camera looking down at a flat ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    /// Meters above the ground.
    pub height: f64,
    /// Tilt below horizontal, degrees.
    pub angle_deg: f64,
    /// Pixels.
    pub focal_length: f64,
    /// Pixels.
    pub image_height: f64,
    /// Meters.
    pub min_distance: f64,
    /// Meters.
    pub max_distance: f64,
}

impl CameraModel {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            height: config.camera_height,
            angle_deg: config.camera_angle,
            focal_length: config.focal_length,
            image_height: config.image_height,
            min_distance: config.min_detection_distance,
            max_distance: config.max_detection_distance,
        }
    }

    /// Estimated ground distance, in meters, to the point seen at image row `y`.
    ///
    /// Rays at or above the horizon never reach the ground and yield infinity.
    pub fn ground_depth(&self, y: f64) -> f64 {
        let y_ground = self.image_height - y;
        let angle_from_center = (y_ground - self.focal_length).atan2(self.focal_length);
        let total_angle = self.angle_deg.to_radians() + angle_from_center;

        if total_angle > 0.0 && total_angle < FRAC_PI_2 {
            (self.height / total_angle.tan()).max(MIN_GROUND_DEPTH)
        } else {
            f64::INFINITY
        }
    }

    /// Planar distance in meters between two image points, or infinity when
    /// either point has no ground depth or the result leaves the detection envelope.
    pub fn perspective_distance(&self, a: Point, b: Point) -> f64 {
        let d1 = self.ground_depth(a.1);
        let d2 = self.ground_depth(b.1);
        if !d1.is_finite() || !d2.is_finite() {
            return f64::INFINITY;
        }

        let dx = (a.0 - b.0) * d1 / self.focal_length;
        let dy = d1 - d2;
        let distance = dx.hypot(dy);

        if distance < self.min_distance || distance > self.max_distance {
            f64::INFINITY
        } else {
            distance
        }
    }

    /// Whether the point's ground depth lies within `[min_distance, max_distance]`.
    pub fn is_within_detection_range(&self, point: Point) -> bool {
        let depth = self.ground_depth(point.1);
        depth >= self.min_distance && depth <= self.max_distance
    }
}
