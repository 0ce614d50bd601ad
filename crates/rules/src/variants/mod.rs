//! The eight safety rule policies.
//!
//! Each variant owns its private tracking state and reads/writes timers and
//! suppression clocks through the [`ViolationLedger`] handed in with every
//! frame. Evaluation is synchronous, bounded and free of I/O.

mod approaching;
mod collision_risk;
mod crowd_in_zone;
mod distance_below;
mod fall_detection;
mod line_cross;
mod speed_over;
mod zone_entry;

pub use approaching::ApproachingRule;
pub use collision_risk::CollisionRiskRule;
pub use crowd_in_zone::CrowdInZoneRule;
pub use distance_below::DistanceBelowRule;
pub use fall_detection::FallDetectionRule;
pub use line_cross::LineCrossRule;
pub use speed_over::SpeedOverRule;
pub use zone_entry::ZoneEntryRule;

use safevision_core::{Detection, FrameContext, GlobalConfig, RuleKind, Violation, ViolationDetail};

use crate::ledger::ViolationLedger;
use crate::schema::{CompiledRule, RuleSpec};

/// Failure inside a single rule's evaluation of a single frame.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("detection '{track_id}' has a non-finite center ({x}, {y})")]
    InvalidDetection { track_id: String, x: f64, y: f64 },
}

/// Per-frame inputs shared by every rule.
pub struct EvalContext<'a> {
    pub frame: &'a FrameContext,
    pub ledger: &'a mut dyn ViolationLedger,
}

impl<'a> EvalContext<'a> {
    pub fn new(frame: &'a FrameContext, ledger: &'a mut dyn ViolationLedger) -> Self {
        Self { frame, ledger }
    }
}

/// A runnable rule instance.
pub trait SafetyRule: Send {
    fn id(&self) -> &str;

    fn kind(&self) -> RuleKind;

    /// Evaluate one frame. `Ok(None)` means nothing to report.
    fn evaluate(
        &mut self,
        detections: &[Detection],
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Violation>, EvaluationError>;

    /// Forget tracks not seen within `max_idle_ms` of `now_ms`.
    fn evict_stale(&mut self, _now_ms: i64, _max_idle_ms: u64) {}
}

/// Instantiate a compiled rule against the current global config.
pub fn build(rule: &CompiledRule, config: &GlobalConfig) -> Box<dyn SafetyRule> {
    let id = rule.id.clone();
    match &rule.spec {
        RuleSpec::DistanceBelow(p) => Box::new(DistanceBelowRule::new(id, p.clone(), config)),
        RuleSpec::ZoneEntry { params, zone } => {
            Box::new(ZoneEntryRule::new(id, params.clone(), zone.clone(), config))
        }
        RuleSpec::SpeedOver(p) => Box::new(SpeedOverRule::new(id, p.clone(), config)),
        RuleSpec::CrowdInZone { params, zone } => {
            Box::new(CrowdInZoneRule::new(id, params.clone(), zone.clone(), config))
        }
        RuleSpec::LineCross { params, line } => {
            Box::new(LineCrossRule::new(id, params.clone(), line.clone(), config))
        }
        RuleSpec::Approaching(p) => Box::new(ApproachingRule::new(id, p.clone(), config)),
        RuleSpec::CollisionRisk(p) => Box::new(CollisionRiskRule::new(id, p.clone(), config)),
        RuleSpec::FallDetection(p) => Box::new(FallDetectionRule::new(id, p.clone(), config)),
    }
}

// ── Shared helpers ───────────────────────────────────────────────────

/// An empty label list matches every label.
pub(crate) fn label_matches(labels: &[String], label: &str) -> bool {
    labels.is_empty() || labels.iter().any(|l| l == label)
}

/// Detections whose label is targeted, rejecting unusable coordinates.
pub(crate) fn targets<'d>(
    detections: &'d [Detection],
    labels: &[String],
) -> Result<Vec<&'d Detection>, EvaluationError> {
    detections
        .iter()
        .filter(|d| label_matches(labels, &d.label))
        .map(|d| {
            if d.has_finite_center() {
                Ok(d)
            } else {
                Err(EvaluationError::InvalidDetection {
                    track_id: d.track_id.clone(),
                    x: d.center_x,
                    y: d.center_y,
                })
            }
        })
        .collect()
}

pub(crate) fn violation(
    rule_id: &str,
    kind: RuleKind,
    violations: Vec<ViolationDetail>,
    summary: String,
) -> Option<Violation> {
    if violations.is_empty() {
        return None;
    }
    Some(Violation {
        rule_id: rule_id.to_string(),
        rule_type: kind,
        violations,
        summary,
    })
}
