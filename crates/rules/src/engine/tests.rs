//! Tests for engine construction, reload and dry runs.

use std::sync::{Arc, Mutex};

use safevision_core::{
    Detection, FrameContext, GlobalConfig, Measurement, RuleKind, Severity, Violation,
    ViolationDetail,
};
use safevision_notify::NoopPublisher;

use super::core::clip_window;
use super::*;
use crate::ledger::{MemoryLedger, ViolationLedger, ViolationTimer};
use crate::schema::RuleDefinition;
use crate::store::MemoryAlertStore;

/// Memory ledger that records every sweep it receives.
#[derive(Default)]
struct SweepLog {
    inner: MemoryLedger,
    sweeps: Arc<Mutex<Vec<(i64, u64)>>>,
}

impl ViolationLedger for SweepLog {
    fn timer(&self, rule_id: &str, entity_key: &str) -> Option<ViolationTimer> {
        self.inner.timer(rule_id, entity_key)
    }

    fn set_timer(&mut self, rule_id: &str, entity_key: &str, timer: ViolationTimer) {
        self.inner.set_timer(rule_id, entity_key, timer)
    }

    fn clear_timer(&mut self, rule_id: &str, entity_key: &str) {
        self.inner.clear_timer(rule_id, entity_key)
    }

    fn last_rule_alert(&self, rule_id: &str) -> Option<i64> {
        self.inner.last_rule_alert(rule_id)
    }

    fn last_entity_alert(&self, rule_id: &str, entity_key: &str) -> Option<i64> {
        self.inner.last_entity_alert(rule_id, entity_key)
    }

    fn last_video_alert(&self, rule_id: &str, video_id: &str) -> Option<i64> {
        self.inner.last_video_alert(rule_id, video_id)
    }

    fn record_alert(&mut self, rule_id: &str, entity_key: &str, video_id: &str, at_ms: i64) {
        self.inner.record_alert(rule_id, entity_key, video_id, at_ms)
    }

    fn evict_stale(&mut self, now_ms: i64, max_idle_ms: u64) -> usize {
        self.sweeps.lock().expect("sweeps lock poisoned").push((now_ms, max_idle_ms));
        self.inner.evict_stale(now_ms, max_idle_ms)
    }
}

fn engine_with(rules: Vec<RuleDefinition>) -> (Arc<StaticRuleSource>, RuleEngine) {
    let source = Arc::new(StaticRuleSource::new(rules, GlobalConfig::default()));
    let engine = RuleEngine::new(
        source.clone(),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(NoopPublisher),
    );
    (source, engine)
}

fn violation(kind: RuleKind, hints: Option<(f64, f64)>) -> Violation {
    let mut detail = ViolationDetail::new("e", Measurement::Movement { duration: 1.0 });
    if let Some((pre, post)) = hints {
        detail = detail.with_clip_hint(pre, post);
    }
    Violation {
        rule_id: "r".to_string(),
        rule_type: kind,
        violations: vec![detail],
        summary: String::new(),
    }
}

#[test]
fn reload_skips_invalid_and_duplicate_rules() {
    let (_, mut engine) = engine_with(vec![
        RuleDefinition::new("a", "distance_below").with_severity(Severity::High),
        RuleDefinition::new("b", "zone_entry"),
        RuleDefinition::new("c", "restricted_area"),
        RuleDefinition::new("a", "speed_over"),
    ]);

    let report = engine.reload().unwrap();
    assert_eq!(report.loaded, vec!["a"]);
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.rule_id.as_str()).collect();
    assert_eq!(skipped, vec!["b", "c", "a"]);
    assert!(report.skipped[0].reason.contains("zone"));

    let rules = engine.rules();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].rule_type, RuleKind::DistanceBelow);
    assert_eq!(rules[0].severity, Severity::High);
}

#[test]
fn disabled_rules_are_not_loaded() {
    let mut disabled = RuleDefinition::new("off", "speed_over");
    disabled.enabled = false;
    let (_, mut engine) = engine_with(vec![disabled, RuleDefinition::new("on", "speed_over")]);

    engine.reload().unwrap();
    let ids: Vec<String> = engine.rules().into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["on"]);
}

#[test]
fn reload_picks_up_new_config() {
    let (source, mut engine) = engine_with(vec![RuleDefinition::new("s", "speed_over")]);
    engine.reload().unwrap();
    assert_eq!(engine.config().cooldown, 60);

    source.set_config(GlobalConfig {
        cooldown: 5,
        ..GlobalConfig::default()
    });
    engine.reload().unwrap();
    assert_eq!(engine.config().cooldown, 5);
}

#[test]
fn dry_run_evaluates_without_touching_active_rules() {
    let (_, mut engine) = engine_with(vec![]);
    engine.reload().unwrap();

    let def = RuleDefinition::new("probe", "collision_risk");
    let dets = vec![
        Detection::at("person_1", "person", 100.0, 100.0),
        Detection::at("forklift_1", "forklift", 110.0, 100.0),
    ];
    let frame = FrameContext::new("v", 1, 0);

    let v = engine.dry_run(&def, &dets, &frame).unwrap().unwrap();
    assert_eq!(v.rule_id, "probe");
    // a second dry run starts from a fresh ledger, so the cooldown does not apply
    assert!(engine.dry_run(&def, &dets, &frame).unwrap().is_some());
    assert!(engine.rules().is_empty());
}

#[test]
fn dry_run_reports_invalid_definitions() {
    let (_, engine) = engine_with(vec![]);
    let frame = FrameContext::new("v", 1, 0);
    let err = engine
        .dry_run(&RuleDefinition::new("bad", "line_cross"), &[], &frame)
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn clip_defaults_to_symmetric_window() {
    let clip = clip_window(&violation(RuleKind::ZoneEntry, None));
    assert_eq!((clip.pre_secs, clip.post_secs, clip.total_secs), (1.5, 1.5, 3.0));

    let clip = clip_window(&violation(RuleKind::SpeedOver, Some((2.0, 4.0))));
    assert_eq!(clip.total_secs, 6.0);
}

#[test]
fn fall_clip_total_is_forced() {
    let clip = clip_window(&violation(RuleKind::FallDetection, Some((1.0, 2.0))));
    assert_eq!(clip.pre_secs, 1.0);
    assert_eq!(clip.post_secs, 2.0);
    assert_eq!(clip.total_secs, 5.0);
}

#[tokio::test]
async fn idle_state_is_swept_on_frame_time() {
    let ledger = SweepLog::default();
    let sweeps = Arc::clone(&ledger.sweeps);
    let config = GlobalConfig {
        cooldown: 600,
        ..GlobalConfig::default()
    };
    let source = Arc::new(StaticRuleSource::new(
        vec![RuleDefinition::new("s", "speed_over")],
        config,
    ));
    let mut engine = RuleEngine::new(
        source,
        Arc::new(MemoryAlertStore::new()),
        Arc::new(NoopPublisher),
    )
    .with_ledger(Box::new(ledger));
    engine.reload().unwrap();

    for ts in [0, 5_000, 10_000, 15_000, 0] {
        engine
            .evaluate_frame(&[], &FrameContext::new("v", 1, ts))
            .await
            .unwrap();
    }

    // the 600s cooldown outlives the default 300s TTL; the clock restart also sweeps
    let sweeps = sweeps.lock().unwrap().clone();
    assert_eq!(sweeps, vec![(10_000, 600_000), (0, 600_000)]);
}
