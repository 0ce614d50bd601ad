//! People too close to any other object, measured in pixels.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::pixel_distance;
use crate::ledger::SuppressionPolicy;
use crate::schema::CollisionRiskParams;

pub struct CollisionRiskRule {
    id: String,
    params: CollisionRiskParams,
    policy: SuppressionPolicy,
}

impl CollisionRiskRule {
    pub fn new(id: String, params: CollisionRiskParams, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            policy: SuppressionPolicy::from_config(config),
        }
    }
}

impl SafetyRule for CollisionRiskRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::CollisionRisk
    }

    fn evaluate(
        &mut self,
        detections: &[Detection],
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Violation>, EvaluationError> {
        let now = ctx.frame.timestamp_ms;
        let objects = targets(detections, &self.params.labels)?;
        let (people, others): (Vec<&Detection>, Vec<&Detection>) = objects
            .into_iter()
            .partition(|d| d.label == self.params.person_label);

        let mut found = Vec::new();
        for person in &people {
            for other in &others {
                let distance = pixel_distance(person.center(), other.center());
                if distance > self.params.min_distance {
                    continue;
                }
                if !self.policy.rule_cooldown_elapsed(&*ctx.ledger, &self.id, now) {
                    tracing::debug!(rule_id = %self.id, distance, "collision risk within cooldown");
                    continue;
                }

                let entity_key = format!("{}_{}", person.track_id, other.track_id);
                ctx.ledger
                    .record_alert(&self.id, &entity_key, &ctx.frame.video_id, now);
                found.push(
                    ViolationDetail::new(
                        entity_key,
                        Measurement::Collision {
                            distance,
                            min_distance: self.params.min_distance,
                        },
                    )
                    .with_objects(vec![person.track_id.clone(), other.track_id.clone()])
                    .with_position(person.center()),
                );
            }
        }

        let summary = format!("collision risk: {} person/object pair(s) too close", found.len());
        Ok(violation(&self.id, RuleKind::CollisionRisk, found, summary))
    }
}
