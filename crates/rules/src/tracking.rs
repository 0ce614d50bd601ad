//! Per-rule-instance memory of the last observed sample for each track.
//!
//! Only a single sample is kept per key: callers read the prior sample,
//! compare it with the current detection, then overwrite it.

use std::collections::HashMap;

use safevision_core::{Detection, FrameContext, Point};

/// Last known observation of a tracked object.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSample {
    pub position: Point,
    pub timestamp_ms: i64,
    pub frame_number: u64,
    pub label: String,
}

impl TrackSample {
    pub fn observe(detection: &Detection, frame: &FrameContext) -> Self {
        Self {
            position: detection.center(),
            timestamp_ms: frame.timestamp_ms,
            frame_number: frame.frame_number,
            label: detection.label.clone(),
        }
    }

    /// Seconds from this sample to `timestamp_ms`.
    pub fn seconds_until(&self, timestamp_ms: i64) -> f64 {
        (timestamp_ms - self.timestamp_ms) as f64 / 1000.0
    }
}

/// track_id -> last sample, plus one optional merged subject.
#[derive(Debug, Default)]
pub struct TrackStore {
    samples: HashMap<String, TrackSample>,
    unified: Option<TrackSample>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: &str) -> Option<&TrackSample> {
        self.samples.get(track_id)
    }

    /// Overwrite the sample for the detection's track, returning the previous one.
    pub fn record(&mut self, detection: &Detection, frame: &FrameContext) -> Option<TrackSample> {
        self.samples.insert(
            detection.track_id.clone(),
            TrackSample::observe(detection, frame),
        )
    }

    /// The merged subject shared by every detection folded into it.
    pub fn unified(&self) -> Option<&TrackSample> {
        self.unified.as_ref()
    }

    /// Fold a detection into the merged subject. Last writer wins.
    pub fn record_unified(&mut self, detection: &Detection, frame: &FrameContext) {
        self.unified = Some(TrackSample::observe(detection, frame));
    }

    /// Drop samples observed more than `max_idle_ms` away from `now_ms`, in
    /// either direction. Returns how many were removed.
    pub fn evict_stale(&mut self, now_ms: i64, max_idle_ms: u64) -> usize {
        let live = |sample: &TrackSample| sample.timestamp_ms.abs_diff(now_ms) <= max_idle_ms;
        let before = self.samples.len();
        self.samples.retain(|_, sample| live(sample));
        let mut evicted = before - self.samples.len();
        if self.unified.as_ref().is_some_and(|sample| !live(sample)) {
            self.unified = None;
            evicted += 1;
        }
        evicted
    }

    /// Number of individually tracked keys (the merged subject is not counted).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.unified.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_returns_prior_sample() {
        let mut store = TrackStore::new();
        let first = Detection::at("forklift_0", "forklift", 10.0, 20.0);
        let second = Detection::at("forklift_0", "forklift", 30.0, 20.0);

        assert!(store
            .record(&first, &FrameContext::new("v", 1, 0))
            .is_none());
        let prior = store
            .record(&second, &FrameContext::new("v", 2, 500))
            .unwrap();
        assert_eq!(prior.position, (10.0, 20.0));
        assert_eq!(prior.frame_number, 1);

        let current = store.get("forklift_0").unwrap();
        assert_eq!(current.position, (30.0, 20.0));
        assert_eq!(current.seconds_until(1_000), 0.5);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unified_subject_is_last_writer_wins() {
        let mut store = TrackStore::new();
        let frame = FrameContext::new("v", 5, 200);
        store.record_unified(&Detection::at("person_0", "person", 1.0, 100.0), &frame);
        store.record_unified(&Detection::at("airplane_0", "airplane", 2.0, 300.0), &frame);

        let unified = store.unified().unwrap();
        assert_eq!(unified.position, (2.0, 300.0));
        assert_eq!(unified.label, "airplane");
        assert_eq!(store.len(), 0);
        assert!(!store.is_empty());
    }

    #[test]
    fn evict_stale_drops_tracks_that_left() {
        let mut store = TrackStore::new();
        store.record(&Detection::at("gone", "person", 0.0, 0.0), &FrameContext::new("v", 1, 0));
        store.record(&Detection::at("here", "person", 0.0, 0.0), &FrameContext::new("v", 900, 90_000));
        store.record_unified(&Detection::at("p", "person", 0.0, 0.0), &FrameContext::new("v", 1, 0));

        assert_eq!(store.evict_stale(100_000, 60_000), 2);
        assert!(store.get("gone").is_none());
        assert!(store.get("here").is_some());
        assert!(store.unified().is_none());
    }
}
