//! Sudden downward jumps of a person's center between nearby frames.
//!
//! Detections whose label is in `merge_labels` are folded into one shared
//! subject, so a detector that flips between labels for the same falling
//! person still yields a continuous trajectory.

use safevision_core::{Detection, GlobalConfig, Measurement, RuleKind, Violation, ViolationDetail};

use super::{targets, violation, EvalContext, EvaluationError, SafetyRule};
use crate::ledger::SuppressionPolicy;
use crate::schema::FallDetectionParams;
use crate::tracking::{TrackSample, TrackStore};

const UNIFIED_KEY: &str = "unified";

pub struct FallDetectionRule {
    id: String,
    params: FallDetectionParams,
    /// `labels` plus `merge_labels`; empty when `labels` matches everything.
    candidates: Vec<String>,
    policy: SuppressionPolicy,
    tracks: TrackStore,
}

impl FallDetectionRule {
    pub fn new(id: String, params: FallDetectionParams, config: &GlobalConfig) -> Self {
        let candidates = if params.labels.is_empty() {
            Vec::new()
        } else {
            let mut all = params.labels.clone();
            all.extend(params.merge_labels.iter().cloned());
            all.sort();
            all.dedup();
            all
        };
        Self {
            id,
            params,
            candidates,
            policy: SuppressionPolicy::from_config(config),
            tracks: TrackStore::new(),
        }
    }

    fn is_merged(&self, label: &str) -> bool {
        self.params.merge_labels.iter().any(|l| l == label)
    }

    fn prior_for(&self, det: &Detection) -> Option<&TrackSample> {
        self.tracks.get(&det.track_id).or_else(|| {
            if self.is_merged(&det.label) {
                self.tracks.unified()
            } else {
                None
            }
        })
    }
}

impl SafetyRule for FallDetectionRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> RuleKind {
        RuleKind::FallDetection
    }

    fn evict_stale(&mut self, now_ms: i64, max_idle_ms: u64) {
        self.tracks.evict_stale(now_ms, max_idle_ms);
    }

    fn evaluate(
        &mut self,
        detections: &[Detection],
        ctx: &mut EvalContext<'_>,
    ) -> Result<Option<Violation>, EvaluationError> {
        let frame = ctx.frame;
        if let Some(window) = self.params.active_frames {
            if !window.contains(frame.frame_number) {
                return Ok(None);
            }
        }

        let now = frame.timestamp_ms;
        let candidates = targets(detections, &self.candidates)?;
        let mut found = Vec::new();

        for det in &candidates {
            let Some(prior) = self.prior_for(det) else {
                continue;
            };
            let y_change = det.center_y - prior.position.1;
            let frame_gap = frame.frame_number.abs_diff(prior.frame_number);
            let time_gap_ms = now - prior.timestamp_ms;

            if y_change <= 0.0
                || y_change < self.params.min_fall_pixels
                || frame_gap > self.params.max_frame_gap
            {
                continue;
            }
            if !self.policy.rule_cooldown_elapsed(&*ctx.ledger, &self.id, now) {
                tracing::debug!(rule_id = %self.id, track_id = %det.track_id, y_change, "fall within cooldown");
                continue;
            }

            let entity_key = if self.is_merged(&det.label) {
                UNIFIED_KEY
            } else {
                det.track_id.as_str()
            };
            tracing::info!(
                rule_id = %self.id,
                track_id = %det.track_id,
                y_change,
                frame_gap,
                "fall detected"
            );
            ctx.ledger
                .record_alert(&self.id, entity_key, &frame.video_id, now);
            found.push(
                ViolationDetail::new(
                    entity_key,
                    Measurement::Fall {
                        y_change,
                        frame_gap,
                        time_gap_ms,
                    },
                )
                .with_objects(vec![det.track_id.clone()])
                .with_position(det.center())
                .with_clip_hint(self.params.pre_duration, self.params.post_duration),
            );
        }

        for det in &candidates {
            if self.is_merged(&det.label) {
                self.tracks.record_unified(det, frame);
            } else {
                self.tracks.record(det, frame);
            }
        }

        let summary = format!("fall detected: {} subject(s)", found.len());
        Ok(violation(&self.id, RuleKind::FallDetection, found, summary))
    }
}
