//! Targets staying inside a danger zone for a sustained period.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::{point_in_polygon, CameraModel};
use crate::ledger::{accrue, clear, mark_fired, Accrual, SuppressionPolicy};
use crate::schema::{Zone, ZoneEntryParams};

pub struct ZoneEntryRule {
    id: String,
    params: ZoneEntryParams,
    zone: Zone,
    camera: CameraModel,
    policy: SuppressionPolicy,
}

impl ZoneEntryRule {
    pub fn new(id: String, params: ZoneEntryParams, zone: Zone, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            zone,
            camera: CameraModel::from_config(config),
            policy: SuppressionPolicy::from_config(config),
        }
    }
}

impl SafetyRule for ZoneEntryRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::ZoneEntry
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
            let pos = det.center();
            if !self.camera.is_within_detection_range(pos) {
                continue;
            }

            let entity_key = det.track_id.as_str();
            if !point_in_polygon(pos, &self.zone.polygon) {
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
                    Measurement::Zone {
                        zone_id: self.zone.id.clone(),
                        zone_name: self.zone.name.clone(),
                        duration: self.params.duration,
                    },
                )
                .with_objects(vec![det.track_id.clone()])
                .with_position(pos),
            );
        }

        let summary = format!("zone entry: {} intrusion(s) into {}", found.len(), self.zone.name);
        Ok(violation(&self.id, RuleKind::ZoneEntry, found, summary))
    }
}
