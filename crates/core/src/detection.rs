use serde::{Deserialize, Serialize};

/// Pixel-space point `(x, y)`.
pub type Point = (f64, f64);

/// A single detected object in one frame, as produced by the upstream detector.
///
/// `track_id` is assigned upstream and assumed stable across frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: String,
    pub label: String,
    /// `[x1, y1, x2, y2]` in pixels.
    #[serde(default)]
    pub bbox: [f64; 4],
    pub center_x: f64,
    pub center_y: f64,
    #[serde(default)]
    pub confidence: f64,
}

impl Detection {
    /// Build a detection centered on `(x, y)` with a zero-size box.
    pub fn at(track_id: impl Into<String>, label: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            track_id: track_id.into(),
            label: label.into(),
            bbox: [x, y, x, y],
            center_x: x,
            center_y: y,
            confidence: 1.0,
        }
    }

    pub fn center(&self) -> Point {
        (self.center_x, self.center_y)
    }

    pub fn width(&self) -> f64 {
        (self.bbox[2] - self.bbox[0]).abs()
    }

    pub fn height(&self) -> f64 {
        (self.bbox[3] - self.bbox[1]).abs()
    }

    /// Whether the center coordinates are usable for geometry.
    pub fn has_finite_center(&self) -> bool {
        self.center_x.is_finite() && self.center_y.is_finite()
    }
}

/// Identifies the frame a batch of detections belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameContext {
    pub video_id: String,
    pub frame_number: u64,
    pub timestamp_ms: i64,
}

impl FrameContext {
    pub fn new(video_id: impl Into<String>, frame_number: u64, timestamp_ms: i64) -> Self {
        Self {
            video_id: video_id.into(),
            frame_number,
            timestamp_ms,
        }
    }
}
