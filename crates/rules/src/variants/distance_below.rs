//! Two targets closer than a safe distance for a sustained period.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::{meter_distance, CameraModel};
use crate::ledger::{accrue, clear, mark_fired, Accrual, SuppressionPolicy};
use crate::schema::DistanceBelowParams;

pub struct DistanceBelowRule {
    id: String,
    params: DistanceBelowParams,
    pixel_to_meter: f64,
    camera: CameraModel,
    policy: SuppressionPolicy,
}

impl DistanceBelowRule {
    pub fn new(id: String, params: DistanceBelowParams, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            pixel_to_meter: config.pixel_to_meter,
            camera: CameraModel::from_config(config),
            policy: SuppressionPolicy::from_config(config),
        }
    }
}

impl SafetyRule for DistanceBelowRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::DistanceBelow
    }

    fn evaluate(
        &mut self,
        detections: &[Detection],
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Violation>, EvaluationError> {
        let objects = targets(detections, &self.params.labels)?;
        if objects.len() < 2 {
            return Ok(None);
        }

        let now = ctx.frame.timestamp_ms;
        let video_id = ctx.frame.video_id.as_str();
        let ledger = &mut *ctx.ledger;
        let mut found = Vec::new();

        for (i, a) in objects.iter().enumerate() {
            for b in &objects[i + 1..] {
                let (pa, pb) = (a.center(), b.center());
                // Pairs outside the camera's usable range keep their timer untouched.
                if !self.camera.is_within_detection_range(pa)
                    || !self.camera.is_within_detection_range(pb)
                {
                    continue;
                }

                let entity_key = format!("{}_{}", a.track_id, b.track_id);
                let distance = meter_distance(pa, pb, self.pixel_to_meter);

                if distance >= self.params.min_distance {
                    clear(ledger, &self.id, &entity_key);
                    continue;
                }

                let Accrual::Matured { .. } =
                    accrue(ledger, &self.id, &entity_key, now, self.params.duration)
                else {
                    continue;
                };

                if self
                    .policy
                    .check(ledger, &self.id, &entity_key, video_id, now)
                    .is_err()
                {
                    continue;
                }

                ledger.record_alert(&self.id, &entity_key, video_id, now);
                mark_fired(ledger, &self.id, &entity_key);

                let midpoint = ((pa.0 + pb.0) / 2.0, (pa.1 + pb.1) / 2.0);
                found.push(
                    ViolationDetail::new(
                        entity_key,
                        Measurement::Distance {
                            distance,
                            min_distance: self.params.min_distance,
                            duration: self.params.duration,
                        },
                    )
                    .with_objects(vec![a.track_id.clone(), b.track_id.clone()])
                    .with_position(midpoint),
                );
            }
        }

        let summary = format!("distance violation: {} pair(s) below safe distance", found.len());
        Ok(violation(&self.id, RuleKind::DistanceBelow, found, summary))
    }
}
