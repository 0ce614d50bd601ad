//! Too many targets inside one zone for a sustained period.
//!
//! A single timer is kept per zone rather than per entity.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::point_in_polygon;
use crate::ledger::{accrue, clear, mark_fired, Accrual, SuppressionPolicy};
use crate::schema::{CrowdInZoneParams, Zone};

pub struct CrowdInZoneRule {
    id: String,
    params: CrowdInZoneParams,
    zone: Zone,
    policy: SuppressionPolicy,
}

impl CrowdInZoneRule {
    pub fn new(id: String, params: CrowdInZoneParams, zone: Zone, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            zone,
            policy: SuppressionPolicy::from_config(config),
        }
    }
}

impl SafetyRule for CrowdInZoneRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::CrowdInZone
    }

    fn evaluate(
        &mut self,
        detections: &[Detection],
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Violation>, EvaluationError> {
        let now = ctx.frame.timestamp_ms;
        let video_id = ctx.frame.video_id.as_str();
        let ledger = &mut *ctx.ledger;
        let zone_key = self.zone.id.as_str();

        let inside: Vec<&Detection> = targets(detections, &self.params.labels)?
            .into_iter()
            .filter(|d| point_in_polygon(d.center(), &self.zone.polygon))
            .collect();

        if inside.len() < self.params.max_count {
            clear(ledger, &self.id, zone_key);
            return Ok(None);
        }

        let Accrual::Matured { .. } =
            accrue(ledger, &self.id, zone_key, now, self.params.duration)
        else {
            return Ok(None);
        };
        if self
            .policy
            .check(ledger, &self.id, zone_key, video_id, now)
            .is_err()
        {
            return Ok(None);
        }

        ledger.record_alert(&self.id, zone_key, video_id, now);
        mark_fired(ledger, &self.id, zone_key);

        let count = inside.len();
        let detail = ViolationDetail::new(
            zone_key,
            Measurement::Crowd {
                zone_id: self.zone.id.clone(),
                zone_name: self.zone.name.clone(),
                count,
                max_count: self.params.max_count,
                duration: self.params.duration,
            },
        )
        .with_objects(inside.iter().map(|d| d.track_id.clone()).collect());

        let summary = format!("crowding: {count} object(s) in {}", self.zone.name);
        Ok(violation(&self.id, RuleKind::CrowdInZone, vec![detail], summary))
    }
}
