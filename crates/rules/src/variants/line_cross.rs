//! Targets whose movement between two samples crosses a safety line.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::segment_crossed;
use crate::ledger::SuppressionPolicy;
use crate::schema::{LineCrossParams, LineSegment};
use crate::tracking::TrackStore;

pub struct LineCrossRule {
    id: String,
    params: LineCrossParams,
    line: LineSegment,
    policy: SuppressionPolicy,
    tracks: TrackStore,
}

impl LineCrossRule {
    pub fn new(id: String, params: LineCrossParams, line: LineSegment, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            line,
            policy: SuppressionPolicy::from_config(config),
            tracks: TrackStore::new(),
        }
    }
}

impl SafetyRule for LineCrossRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::LineCross
    }

    fn evict_stale(&mut self, now_ms: i64, max_idle_ms: u64) {
        self.tracks.evict_stale(now_ms, max_idle_ms);
    }

    fn evaluate(
        &mut self,
        detections: &[Detection],
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Violation>, EvaluationError> {
        let now = ctx.frame.timestamp_ms;
        let mut found = Vec::new();

        for det in targets(detections, &self.params.labels)? {
            let curr = det.center();
            let Some(prior) = self.tracks.record(det, ctx.frame) else {
                continue;
            };
            if !segment_crossed(self.line.start, self.line.end, prior.position, curr) {
                continue;
            }
            if !self.policy.rule_cooldown_elapsed(&*ctx.ledger, &self.id, now) {
                tracing::debug!(rule_id = %self.id, track_id = %det.track_id, "line crossing within cooldown");
                continue;
            }

            ctx.ledger
                .record_alert(&self.id, &det.track_id, &ctx.frame.video_id, now);
            found.push(
                ViolationDetail::new(
                    det.track_id.as_str(),
                    Measurement::LineCross {
                        line_id: self.line.id.clone(),
                        line_name: self.line.name.clone(),
                    },
                )
                .with_objects(vec![det.track_id.clone()])
                .with_position(curr),
            );
        }

        let summary = format!("line crossing: {} object(s) crossed {}", found.len(), self.line.name);
        Ok(violation(&self.id, RuleKind::LineCross, found, summary))
    }
}
