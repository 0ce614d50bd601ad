use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detection::{FrameContext, Point};

// ── Rule kinds ────────────────────────────────────────────────

/// The eight supported safety rule types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    DistanceBelow,
    ZoneEntry,
    SpeedOver,
    CrowdInZone,
    LineCross,
    Approaching,
    CollisionRisk,
    FallDetection,
}

impl RuleKind {
    pub const ALL: [RuleKind; 8] = [
        RuleKind::DistanceBelow,
        RuleKind::ZoneEntry,
        RuleKind::SpeedOver,
        RuleKind::CrowdInZone,
        RuleKind::LineCross,
        RuleKind::Approaching,
        RuleKind::CollisionRisk,
        RuleKind::FallDetection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::DistanceBelow => "distance_below",
            RuleKind::ZoneEntry => "zone_entry",
            RuleKind::SpeedOver => "speed_over",
            RuleKind::CrowdInZone => "crowd_in_zone",
            RuleKind::LineCross => "line_cross",
            RuleKind::Approaching => "approaching",
            RuleKind::CollisionRisk => "collision_risk",
            RuleKind::FallDetection => "fall_detection",
        }
    }

    /// Duration-accrual rules need a predicate to hold for N seconds before alerting.
    /// Everything else fires on the triggering frame, gated only by cooldown.
    pub fn is_duration_accrual(&self) -> bool {
        matches!(
            self,
            RuleKind::DistanceBelow
                | RuleKind::ZoneEntry
                | RuleKind::CrowdInZone
                | RuleKind::Approaching
        )
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        RuleKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown rule type: '{}'", s))
    }
}

// ── Severity / status ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert handling lifecycle. The engine only ever emits `Unprocessed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Unprocessed,
    Processing,
    Completed,
}

// ── Violations ────────────────────────────────────────────────

/// Rule-specific measurement attached to a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    Distance {
        distance: f64,
        min_distance: f64,
        duration: f64,
    },
    Zone {
        zone_id: String,
        zone_name: String,
        duration: f64,
    },
    Speed {
        label: String,
        speed: f64,
        max_speed: f64,
    },
    Crowd {
        zone_id: String,
        zone_name: String,
        count: usize,
        max_count: usize,
        duration: f64,
    },
    LineCross {
        line_id: String,
        line_name: String,
    },
    Movement {
        duration: f64,
    },
    Collision {
        distance: f64,
        min_distance: f64,
    },
    Fall {
        y_change: f64,
        frame_gap: u64,
        time_gap_ms: i64,
    },
}

/// One offending subject within a [`Violation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationDetail {
    pub entity_key: String,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point>,
    #[serde(flatten)]
    pub measurement: Measurement,
    /// Seconds of footage wanted before the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_duration: Option<f64>,
    /// Seconds of footage wanted after the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_duration: Option<f64>,
}

impl ViolationDetail {
    pub fn new(entity_key: impl Into<String>, measurement: Measurement) -> Self {
        Self {
            entity_key: entity_key.into(),
            objects: Vec::new(),
            position: None,
            measurement,
            pre_duration: None,
            post_duration: None,
        }
    }

    pub fn with_objects(mut self, objects: Vec<String>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_clip_hint(mut self, pre: f64, post: f64) -> Self {
        self.pre_duration = Some(pre);
        self.post_duration = Some(post);
        self
    }
}

/// Output of a single rule evaluation that found something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_type: RuleKind,
    pub violations: Vec<ViolationDetail>,
    pub summary: String,
}

// ── Alerts ────────────────────────────────────────────────────

/// Seconds of footage to cut around an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub pre_secs: f64,
    pub post_secs: f64,
    pub total_secs: f64,
}

impl ClipWindow {
    pub const DEFAULT_HALF_SECS: f64 = 1.5;

    pub fn new(pre_secs: f64, post_secs: f64) -> Self {
        Self {
            pre_secs,
            post_secs,
            total_secs: pre_secs + post_secs,
        }
    }
}

impl Default for ClipWindow {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HALF_SECS, Self::DEFAULT_HALF_SECS)
    }
}

/// A deduplicated, persisted safety alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "alertId")]
    pub alert_id: String,
    pub rule_id: String,
    pub rule_type: RuleKind,
    pub ts_ms: i64,
    pub summary: String,
    pub detail: Violation,
    pub video_id: String,
    pub frame_number: u64,
    pub severity: Severity,
    #[serde(default)]
    pub status: AlertStatus,
    pub clip: ClipWindow,
}

impl Alert {
    /// Build an unprocessed alert for `violation` observed at `frame`.
    pub fn from_violation(
        violation: Violation,
        frame: &FrameContext,
        severity: Severity,
        clip: ClipWindow,
    ) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            rule_id: violation.rule_id.clone(),
            rule_type: violation.rule_type,
            ts_ms: frame.timestamp_ms,
            summary: violation.summary.clone(),
            detail: violation,
            video_id: frame.video_id.clone(),
            frame_number: frame.frame_number,
            severity,
            status: AlertStatus::Unprocessed,
            clip,
        }
    }
}

/// Audit record of one rule evaluated against one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecution {
    pub rule_id: String,
    pub video_id: String,
    pub frame_number: u64,
    pub timestamp_ms: i64,
    pub fired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
