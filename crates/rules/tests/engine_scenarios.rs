//! End-to-end frame scenarios through `RuleEngine` with in-memory collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use safevision_core::{Alert, Detection, FrameContext, GlobalConfig, RuleExecution, RuleKind};
use safevision_notify::{AlertPublisher, NoopPublisher, NotifyError};
use safevision_rules::engine::{EngineError, RuleEngine, RuleSource, StaticRuleSource};
use safevision_rules::loader::RuleError;
use safevision_rules::schema::RuleDefinition;
use safevision_rules::store::{AlertStore, MemoryAlertStore, StoreError};

// ── Collaborators ───────────────────────────────────────────────────

struct RecordingPublisher {
    tx: mpsc::UnboundedSender<Alert>,
}

impl RecordingPublisher {
    fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertPublisher for RecordingPublisher {
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.tx
            .send(alert.clone())
            .map_err(|e| NotifyError::Channel(e.to_string()))
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

/// Delivers after a delay, like a slow webhook.
struct SlowPublisher {
    delay: Duration,
    inner: RecordingPublisher,
}

#[async_trait]
impl AlertPublisher for SlowPublisher {
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        tokio::time::sleep(self.delay).await;
        self.inner.publish(alert).await
    }

    fn channel_name(&self) -> &str {
        "slow"
    }
}

/// Delegates to a memory store, failing the operations it is told to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryAlertStore,
    fail_writes: bool,
    fail_dedup: bool,
}

#[async_trait]
impl AlertStore for FlakyStore {
    async fn create_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.create_alert(alert).await
    }

    async fn save_rule_execution(&self, execution: &RuleExecution) -> Result<(), StoreError> {
        self.inner.save_rule_execution(execution).await
    }

    async fn is_alert_cooldown_active(
        &self,
        video_id: &str,
        rule_type: RuleKind,
        window_secs: u64,
        at_ms: i64,
    ) -> Result<bool, StoreError> {
        if self.fail_dedup {
            return Err(StoreError::Unavailable("timeout".to_string()));
        }
        self.inner
            .is_alert_cooldown_active(video_id, rule_type, window_secs, at_ms)
            .await
    }
}

/// Static rules whose availability can be switched off.
struct SwitchableSource {
    inner: StaticRuleSource,
    offline: AtomicBool,
}

impl RuleSource for SwitchableSource {
    fn enabled_rules(&self) -> Result<Vec<RuleDefinition>, RuleError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RuleError::Validation("rule store offline".to_string()));
        }
        self.inner.enabled_rules()
    }

    fn global_config(&self) -> Result<GlobalConfig, RuleError> {
        self.inner.global_config()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn proximity_rule() -> RuleDefinition {
    RuleDefinition::new("forklift-proximity", "distance_below").with_params(serde_json::json!({
        "min_distance": 1.5,
        "duration": 3,
        "labels": ["person", "forklift"]
    }))
}

fn collision_rule(id: &str) -> RuleDefinition {
    RuleDefinition::new(id, "collision_risk")
}

fn engine(
    rules: Vec<RuleDefinition>,
    config: GlobalConfig,
    store: Arc<dyn AlertStore>,
    publisher: Arc<dyn AlertPublisher>,
) -> RuleEngine {
    let source = Arc::new(StaticRuleSource::new(rules, config));
    let mut engine = RuleEngine::new(source, store, publisher);
    engine.reload().expect("reload");
    engine
}

fn frame(n: u64, ts_ms: i64) -> FrameContext {
    FrameContext::new("cam-1", n, ts_ms)
}

/// Person and forklift 20px (1 m) apart, in camera range.
fn close_pair() -> Vec<Detection> {
    vec![
        Detection::at("person_1", "person", 500.0, 100.0),
        Detection::at("forklift_1", "forklift", 520.0, 100.0),
    ]
}

fn person_by_forklift() -> Vec<Detection> {
    vec![
        Detection::at("person_1", "person", 100.0, 100.0),
        Detection::at("forklift_1", "forklift", 120.0, 100.0),
    ]
}

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn sustained_proximity_emits_one_persisted_published_alert() {
    let store = Arc::new(MemoryAlertStore::new());
    let (publisher, mut published) = RecordingPublisher::new();
    let mut engine = engine(
        vec![proximity_rule()],
        GlobalConfig::default(),
        store.clone(),
        Arc::new(publisher),
    );

    let mut emitted = Vec::new();
    for i in 0..=5u64 {
        let alerts = engine
            .evaluate_frame(&close_pair(), &frame(i * 30, i as i64 * 1_000))
            .await
            .unwrap();
        emitted.extend(alerts);
    }

    assert_eq!(emitted.len(), 1);
    let alert = &emitted[0];
    assert_eq!(alert.ts_ms, 3_000);
    assert_eq!(alert.rule_type, RuleKind::DistanceBelow);
    assert_eq!(alert.detail.violations[0].entity_key, "person_1_forklift_1");
    assert_eq!(alert.clip.total_secs, 3.0);

    assert_eq!(store.alerts(), emitted);

    let executions = store.executions("forklift-proximity");
    assert_eq!(executions.len(), 6);
    let fired: Vec<u64> = executions
        .iter()
        .filter(|e| e.fired)
        .map(|e| e.frame_number)
        .collect();
    assert_eq!(fired, vec![90]);

    let delivered = tokio::time::timeout(Duration::from_secs(1), published.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.alert_id, alert.alert_id);
}

#[tokio::test]
async fn replaying_a_stream_is_deterministic() {
    async fn replay() -> Vec<(String, i64, u64, serde_json::Value)> {
        let mut engine = engine(
            vec![proximity_rule(), collision_rule("collide")],
            GlobalConfig::default(),
            Arc::new(MemoryAlertStore::new()),
            Arc::new(NoopPublisher),
        );
        let mut out = Vec::new();
        for i in 0..40u64 {
            let alerts = engine
                .evaluate_frame(&close_pair(), &frame(i, i as i64 * 500))
                .await
                .unwrap();
            out.extend(alerts.into_iter().map(|a| {
                let detail = serde_json::to_value(&a.detail).unwrap();
                (a.rule_id, a.ts_ms, a.frame_number, detail)
            }));
        }
        out
    }

    let first = replay().await;
    assert!(!first.is_empty());
    assert_eq!(first, replay().await);
}

#[tokio::test]
async fn rule_cooldown_drops_repeat_triggers() {
    let config = GlobalConfig {
        cooldown: 30,
        ..GlobalConfig::default()
    };
    let mut engine = engine(
        vec![collision_rule("collide")],
        config,
        Arc::new(MemoryAlertStore::new()),
        Arc::new(NoopPublisher),
    );

    let mut times = Vec::new();
    for (i, ts) in [0, 10_000, 20_000, 30_000].into_iter().enumerate() {
        for alert in engine
            .evaluate_frame(&person_by_forklift(), &frame(i as u64, ts))
            .await
            .unwrap()
        {
            times.push(alert.ts_ms);
        }
    }
    assert_eq!(times, vec![0, 30_000]);
}

#[tokio::test]
async fn fall_alert_gets_five_second_clip() {
    let mut engine = engine(
        vec![RuleDefinition::new("fall", "fall_detection")],
        GlobalConfig::default(),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(NoopPublisher),
    );

    let standing = vec![Detection::at("person_7", "person", 640.0, 300.0)];
    let fallen = vec![Detection::at("person_7", "person", 640.0, 400.0)];
    assert!(engine.evaluate_frame(&standing, &frame(10, 400)).await.unwrap().is_empty());
    let alerts = engine.evaluate_frame(&fallen, &frame(14, 560)).await.unwrap();

    assert_eq!(alerts.len(), 1);
    let clip = alerts[0].clip;
    assert_eq!((clip.pre_secs, clip.post_secs, clip.total_secs), (1.5, 3.5, 5.0));
}

#[tokio::test]
async fn dedup_window_suppresses_same_type_alerts() {
    let store = Arc::new(MemoryAlertStore::new());
    let mut engine = engine(
        vec![collision_rule("collide-a"), collision_rule("collide-b")],
        GlobalConfig::default(),
        store.clone(),
        Arc::new(NoopPublisher),
    );

    let alerts = engine
        .evaluate_frame(&person_by_forklift(), &frame(1, 0))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, "collide-a");

    let suppressed = &store.executions("collide-b")[0];
    assert!(!suppressed.fired);
    assert_eq!(
        suppressed.details,
        Some(serde_json::json!({"suppressed": "dedup_window"}))
    );
}

#[tokio::test]
async fn failing_rule_does_not_block_others() {
    let store = Arc::new(MemoryAlertStore::new());
    let worker_collision = RuleDefinition::new("worker-collision", "collision_risk").with_params(
        serde_json::json!({"person_label": "worker", "labels": ["worker", "forklift"]}),
    );
    let mut engine = engine(
        vec![proximity_rule(), worker_collision],
        GlobalConfig::default(),
        store.clone(),
        Arc::new(NoopPublisher),
    );

    let dets = vec![
        Detection::at("person_1", "person", f64::NAN, 100.0),
        Detection::at("worker_1", "worker", 100.0, 100.0),
        Detection::at("forklift_1", "forklift", 110.0, 100.0),
    ];
    let alerts = engine.evaluate_frame(&dets, &frame(1, 0)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id, "worker-collision");

    let failed = &store.executions("forklift-proximity")[0];
    assert!(!failed.fired);
    let error = failed.details.as_ref().unwrap()["error"].as_str().unwrap();
    assert!(error.contains("person_1"));
}

#[tokio::test]
async fn failed_alert_write_is_returned() {
    let store = Arc::new(FlakyStore {
        fail_writes: true,
        ..FlakyStore::default()
    });
    let mut engine = engine(
        vec![collision_rule("collide")],
        GlobalConfig::default(),
        store,
        Arc::new(NoopPublisher),
    );

    let err = engine
        .evaluate_frame(&person_by_forklift(), &frame(1, 0))
        .await
        .unwrap_err();
    match err {
        EngineError::Persistence { rule_id, .. } => assert_eq!(rule_id, "collide"),
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn dedup_read_failure_counts_as_inactive() {
    let store = Arc::new(FlakyStore {
        fail_dedup: true,
        ..FlakyStore::default()
    });
    let mut engine = engine(
        vec![collision_rule("collide")],
        GlobalConfig::default(),
        store.clone(),
        Arc::new(NoopPublisher),
    );

    let alerts = engine
        .evaluate_frame(&person_by_forklift(), &frame(1, 0))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(store.inner.alerts().len(), 1);
}

#[tokio::test]
async fn reload_keeps_cooldowns_and_survives_source_failure() {
    let source = Arc::new(SwitchableSource {
        inner: StaticRuleSource::new(vec![collision_rule("collide")], GlobalConfig::default()),
        offline: AtomicBool::new(false),
    });
    let mut engine = RuleEngine::new(
        source.clone(),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(NoopPublisher),
    );
    engine.reload().unwrap();

    let first = engine
        .evaluate_frame(&person_by_forklift(), &frame(1, 0))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    engine.reload().unwrap();
    // past the 3s dedup window, still inside the 60s rule cooldown
    let again = engine
        .evaluate_frame(&person_by_forklift(), &frame(2, 10_000))
        .await
        .unwrap();
    assert!(again.is_empty());

    source.offline.store(true, Ordering::SeqCst);
    assert!(matches!(engine.reload(), Err(EngineError::Source(_))));
    assert_eq!(engine.rules().len(), 1);
}

#[tokio::test]
async fn flush_waits_for_in_flight_deliveries() {
    let (recording, mut published) = RecordingPublisher::new();
    let publisher = SlowPublisher {
        delay: Duration::from_millis(200),
        inner: recording,
    };
    let mut engine = engine(
        vec![collision_rule("collide")],
        GlobalConfig::default(),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(publisher),
    );

    let alerts = engine
        .evaluate_frame(&person_by_forklift(), &frame(1, 0))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(published.try_recv().is_err());

    assert_eq!(engine.flush_publishes(Duration::from_secs(5)).await, 1);
    let delivered = published.try_recv().unwrap();
    assert_eq!(delivered.alert_id, alerts[0].alert_id);
    assert_eq!(engine.flush_publishes(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn new_video_with_restarted_clock_is_not_in_cooldown() {
    let mut engine = engine(
        vec![collision_rule("collide")],
        GlobalConfig::default(),
        Arc::new(MemoryAlertStore::new()),
        Arc::new(NoopPublisher),
    );

    let first = engine
        .evaluate_frame(&person_by_forklift(), &FrameContext::new("video-a", 3_000, 100_000))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    let second = engine
        .evaluate_frame(&person_by_forklift(), &FrameContext::new("video-b", 30, 1_000))
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].video_id, "video-b");
}
