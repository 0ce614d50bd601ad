//! Strongly typed parameters, one struct per rule kind.
//!
//! Every struct rejects unknown fields and fills missing ones with the
//! kind's defaults. Durations are seconds, distances are meters unless the
//! field says pixels.

use serde::{Deserialize, Serialize};

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ── Distance / zone / crowd ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DistanceBelowParams {
    pub min_distance: f64,
    pub duration: f64,
    pub labels: Vec<String>,
}

impl Default for DistanceBelowParams {
    fn default() -> Self {
        Self {
            min_distance: 2.0,
            duration: 3.0,
            labels: labels(&["person", "forklift"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ZoneEntryParams {
    pub duration: f64,
    pub labels: Vec<String>,
}

impl Default for ZoneEntryParams {
    fn default() -> Self {
        Self {
            duration: 2.0,
            labels: labels(&["person"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CrowdInZoneParams {
    pub max_count: usize,
    pub duration: f64,
    pub labels: Vec<String>,
}

impl Default for CrowdInZoneParams {
    fn default() -> Self {
        Self {
            max_count: 3,
            duration: 5.0,
            labels: labels(&["person"]),
        }
    }
}

// ── Motion ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SpeedOverParams {
    /// Meters per second.
    pub max_speed: f64,
    pub labels: Vec<String>,
}

impl Default for SpeedOverParams {
    fn default() -> Self {
        Self {
            max_speed: 5.0,
            labels: labels(&["forklift", "car", "truck"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct LineCrossParams {
    pub labels: Vec<String>,
}

impl Default for LineCrossParams {
    fn default() -> Self {
        Self {
            labels: labels(&["person", "forklift"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ApproachingParams {
    pub duration: f64,
    pub labels: Vec<String>,
}

impl Default for ApproachingParams {
    fn default() -> Self {
        Self {
            duration: 3.0,
            labels: labels(&["person", "forklift"]),
        }
    }
}

// ── Proximity / fall ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CollisionRiskParams {
    /// Pixels, not meters.
    pub min_distance: f64,
    pub person_label: String,
    /// Empty matches every label.
    pub labels: Vec<String>,
}

impl Default for CollisionRiskParams {
    fn default() -> Self {
        Self {
            min_distance: 50.0,
            person_label: "person".to_string(),
            labels: Vec::new(),
        }
    }
}

/// Inclusive range of frame numbers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FrameWindow {
    pub start: u64,
    pub end: u64,
}

impl FrameWindow {
    pub fn contains(&self, frame_number: u64) -> bool {
        (self.start..=self.end).contains(&frame_number)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct FallDetectionParams {
    pub min_fall_pixels: f64,
    pub max_frame_gap: u64,
    pub labels: Vec<String>,
    /// Labels folded into one shared subject sample.
    pub merge_labels: Vec<String>,
    /// `None` keeps the rule active on every frame.
    pub active_frames: Option<FrameWindow>,
    pub pre_duration: f64,
    pub post_duration: f64,
}

impl Default for FallDetectionParams {
    fn default() -> Self {
        Self {
            min_fall_pixels: 70.0,
            max_frame_gap: 10,
            labels: labels(&["person"]),
            merge_labels: labels(&["person", "airplane"]),
            active_frames: None,
            pre_duration: 1.5,
            post_duration: 3.5,
        }
    }
}
