//! Targets that keep moving for a sustained period.
//!
//! Any displacement between consecutive samples counts as approaching; the
//! distance to other objects is not considered.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::pixel_distance;
use crate::ledger::{accrue, clear, mark_fired, Accrual, SuppressionPolicy};
use crate::schema::ApproachingParams;
use crate::tracking::TrackStore;

pub struct ApproachingRule {
    id: String,
    params: ApproachingParams,
    policy: SuppressionPolicy,
    tracks: TrackStore,
}

impl ApproachingRule {
    pub fn new(id: String, params: ApproachingParams, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            policy: SuppressionPolicy::from_config(config),
            tracks: TrackStore::new(),
        }
    }
}

impl SafetyRule for ApproachingRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Approaching
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
        let video_id = ctx.frame.video_id.as_str();
        let ledger = &mut *ctx.ledger;
        let mut found = Vec::new();

        for det in targets(detections, &self.params.labels)? {
            let entity_key = det.track_id.as_str();
            let moved = self
                .tracks
                .record(det, ctx.frame)
                .is_some_and(|prior| {
                    prior.seconds_until(now) > 0.0 && pixel_distance(prior.position, det.center()) > 0.0
                });

            if !moved {
                clear(ledger, &self.id, entity_key);
                continue;
            }

            let Accrual::Matured { .. } =
                accrue(ledger, &self.id, entity_key, now, self.params.duration)
            else {
                continue;
            };
            if self
                .policy
                .check(ledger, &self.id, entity_key, video_id, now)
                .is_err()
            {
                continue;
            }

            ledger.record_alert(&self.id, entity_key, video_id, now);
            mark_fired(ledger, &self.id, entity_key);
            found.push(
                ViolationDetail::new(
                    entity_key,
                    Measurement::Movement {
                        duration: self.params.duration,
                    },
                )
                .with_objects(vec![det.track_id.clone()])
                .with_position(det.center()),
            );
        }

        let summary = format!("approaching: {} object(s) in sustained motion", found.len());
        Ok(violation(&self.id, RuleKind::Approaching, found, summary))
    }
}
