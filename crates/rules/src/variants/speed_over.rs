//! Targets moving faster than a speed limit between two consecutive samples.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::geometry::meter_distance;
use crate::ledger::SuppressionPolicy;
use crate::schema::SpeedOverParams;
use crate::tracking::{TrackSample, TrackStore};

/// Samples further apart than this are stale; closer than `MIN_SAMPLE_GAP_SECS` are too noisy.
const MAX_SAMPLE_GAP_SECS: f64 = 1.0;
const MIN_SAMPLE_GAP_SECS: f64 = 0.1;
/// Speeds at or above this are treated as tracking glitches.
const MAX_PLAUSIBLE_SPEED: f64 = 100.0;

pub struct SpeedOverRule {
    id: String,
    params: SpeedOverParams,
    pixel_to_meter: f64,
    policy: SuppressionPolicy,
    tracks: TrackStore,
}

impl SpeedOverRule {
    pub fn new(id: String, params: SpeedOverParams, config: &GlobalConfig) -> Self {
        Self {
            id,
            params,
            pixel_to_meter: config.pixel_to_meter,
            policy: SuppressionPolicy::from_config(config),
            tracks: TrackStore::new(),
        }
    }

    /// Meters per second from `prior` to `det`, or `None` when unusable.
    fn speed(&self, prior: &TrackSample, det: &Detection, now_ms: i64) -> Option<f64> {
        let dt = prior.seconds_until(now_ms);
        if !(MIN_SAMPLE_GAP_SECS..=MAX_SAMPLE_GAP_SECS).contains(&dt) {
            return None;
        }
        let speed = meter_distance(prior.position, det.center(), self.pixel_to_meter) / dt;
        (speed > 0.0 && speed < MAX_PLAUSIBLE_SPEED).then_some(speed)
    }
}

impl SafetyRule for SpeedOverRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::SpeedOver
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
            let prior = self.tracks.record(det, ctx.frame);
            let Some(speed) = prior.and_then(|p| self.speed(&p, det, now)) else {
                continue;
            };
            if speed <= self.params.max_speed {
                continue;
            }
            if !self.policy.rule_cooldown_elapsed(&*ctx.ledger, &self.id, now) {
                tracing::debug!(rule_id = %self.id, track_id = %det.track_id, speed, "speeding within cooldown");
                continue;
            }

            ctx.ledger
                .record_alert(&self.id, &det.track_id, &ctx.frame.video_id, now);
            found.push(
                ViolationDetail::new(
                    det.track_id.as_str(),
                    Measurement::Speed {
                        label: det.label.clone(),
                        speed,
                        max_speed: self.params.max_speed,
                    },
                )
                .with_objects(vec![det.track_id.clone()])
                .with_position(det.center()),
            );
        }

        let summary = format!("speeding: {} object(s) over {} m/s", found.len(), self.params.max_speed);
        Ok(violation(&self.id, RuleKind::SpeedOver, found, summary))
    }
}
