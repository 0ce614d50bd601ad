//! [`RuleEngine`]: the per-frame pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use safevision_core::{
    Alert, ClipWindow, Detection, FrameContext, GlobalConfig, RuleExecution, RuleKind, Severity,
    Violation,
};
use safevision_notify::AlertPublisher;

use crate::ledger::{MemoryLedger, ViolationLedger};
use crate::schema::RuleDefinition;
use crate::store::AlertStore;
use crate::variants::{self, EvalContext, SafetyRule};

use super::error::EngineError;
use super::source::RuleSource;

/// Total clip length forced for fall alerts.
const FALL_CLIP_TOTAL_SECS: f64 = 5.0;

/// Frame time between sweeps for idle rule state.
const SWEEP_EVERY_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Same-video, same-rule-type alerts closer than this are dropped.
    pub dedup_window_secs: u64,
    /// Timers, clocks and track samples idle for longer than this are
    /// dropped. Never shorter than the longest suppression window.
    pub state_ttl_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dedup_window_secs: 3,
            state_ttl_secs: 300,
        }
    }
}

/// Summary of an active rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub rule_type: RuleKind,
    pub severity: Severity,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRule {
    pub rule_id: String,
    pub reason: String,
}

/// Outcome of [`RuleEngine::reload`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReloadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<SkippedRule>,
}

struct ActiveRule {
    info: RuleInfo,
    instance: Box<dyn SafetyRule>,
}

/// Evaluates frames against the active rule set.
///
/// `evaluate_frame` takes `&mut self`: one frame in flight per engine.
/// Process several videos concurrently with one engine each.
pub struct RuleEngine {
    source: Arc<dyn RuleSource>,
    store: Arc<dyn AlertStore>,
    publisher: Arc<dyn AlertPublisher>,
    ledger: Box<dyn ViolationLedger>,
    settings: EngineSettings,
    config: GlobalConfig,
    rules: Vec<ActiveRule>,
    last_sweep_ms: Option<i64>,
    publishes: Vec<JoinHandle<()>>,
}

impl RuleEngine {
    /// Create an engine with no active rules. Call [`reload`](Self::reload) to load them.
    pub fn new(
        source: Arc<dyn RuleSource>,
        store: Arc<dyn AlertStore>,
        publisher: Arc<dyn AlertPublisher>,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            ledger: Box::new(MemoryLedger::new()),
            settings: EngineSettings::default(),
            config: GlobalConfig::default(),
            rules: Vec::new(),
            last_sweep_ms: None,
            publishes: Vec::new(),
        }
    }

    pub fn with_ledger(mut self, ledger: Box<dyn ViolationLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Global config the active rules were built with.
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn rules(&self) -> Vec<RuleInfo> {
        self.rules.iter().map(|r| r.info.clone()).collect()
    }

    /// Rebuild every rule instance from the source.
    ///
    /// Rules that fail validation are skipped. If the source itself fails the
    /// current rule set stays active. Per-rule tracking state starts fresh;
    /// timers and cooldowns live in the ledger and carry over.
    pub fn reload(&mut self) -> Result<ReloadReport, EngineError> {
        let config = self.source.global_config()?;
        let definitions = self.source.enabled_rules()?;

        let mut report = ReloadReport::default();
        let mut rules = Vec::with_capacity(definitions.len());
        let mut seen = HashSet::new();

        for def in definitions {
            if !seen.insert(def.id.clone()) {
                warn!(rule_id = %def.id, "duplicate rule id, skipping");
                report.skipped.push(SkippedRule {
                    rule_id: def.id,
                    reason: "duplicate rule id".to_string(),
                });
                continue;
            }

            match def.compile() {
                Ok(compiled) => {
                    let info = RuleInfo {
                        id: compiled.id.clone(),
                        name: compiled.name.clone(),
                        rule_type: compiled.kind(),
                        severity: compiled.severity,
                        description: compiled.description.clone(),
                    };
                    let instance = variants::build(&compiled, &config);
                    report.loaded.push(info.id.clone());
                    rules.push(ActiveRule { info, instance });
                }
                Err(e) => {
                    warn!(rule_id = %def.id, error = %e, "invalid rule, skipping");
                    report.skipped.push(SkippedRule {
                        rule_id: def.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "reloaded rules"
        );
        self.rules = rules;
        self.config = config;
        Ok(report)
    }

    /// Evaluate one frame and return the alerts it produced, in rule order.
    ///
    /// Every returned alert has been persisted. A failing rule is logged and
    /// recorded; it never stops the others. Only a failed alert write is
    /// returned as an error.
    pub async fn evaluate_frame(
        &mut self,
        detections: &[Detection],
        frame: &FrameContext,
    ) -> Result<Vec<Alert>, EngineError> {
        self.sweep_idle_state(frame.timestamp_ms);
        let mut alerts = Vec::new();

        for rule in self.rules.iter_mut() {
            let outcome = {
                let mut ctx = EvalContext::new(frame, self.ledger.as_mut());
                rule.instance.evaluate(detections, &mut ctx)
            };
            let rule_id = rule.info.id.as_str();

            let violation = match outcome {
                Ok(Some(v)) => v,
                Ok(None) => {
                    record_execution(self.store.as_ref(), rule_id, frame, false, None).await;
                    continue;
                }
                Err(e) => {
                    warn!(rule_id, frame = frame.frame_number, error = %e, "rule evaluation failed");
                    let details = json!({ "error": e.to_string() });
                    record_execution(self.store.as_ref(), rule_id, frame, false, Some(details)).await;
                    continue;
                }
            };

            let duplicate = match self
                .store
                .is_alert_cooldown_active(
                    &frame.video_id,
                    violation.rule_type,
                    self.settings.dedup_window_secs,
                    frame.timestamp_ms,
                )
                .await
            {
                Ok(active) => active,
                Err(e) => {
                    warn!(rule_id, error = %e, "dedup check failed, treating as inactive");
                    false
                }
            };
            if duplicate {
                debug!(rule_id, video_id = %frame.video_id, "alert inside dedup window");
                let details = json!({ "suppressed": "dedup_window" });
                record_execution(self.store.as_ref(), rule_id, frame, false, Some(details)).await;
                continue;
            }

            let clip = clip_window(&violation);
            let alert = Alert::from_violation(violation, frame, rule.info.severity, clip);
            self.store
                .create_alert(&alert)
                .await
                .map_err(|source| EngineError::Persistence {
                    rule_id: rule_id.to_string(),
                    source,
                })?;
            info!(
                alert_id = %alert.alert_id,
                rule_id,
                rule_type = %alert.rule_type,
                video_id = %alert.video_id,
                frame = alert.frame_number,
                "alert emitted"
            );

            spawn_publish(&mut self.publishes, Arc::clone(&self.publisher), alert.clone());

            let details = serde_json::to_value(&alert.detail).ok();
            record_execution(self.store.as_ref(), rule_id, frame, true, details).await;
            alerts.push(alert);
        }

        Ok(alerts)
    }

    /// Wait up to `timeout` for spawned alert deliveries to finish.
    ///
    /// Returns how many deliveries were still in flight. Call before the
    /// runtime shuts down so the last alerts are not dropped.
    pub async fn flush_publishes(&mut self, timeout: Duration) -> usize {
        let pending = std::mem::take(&mut self.publishes);
        let count = pending.len();
        let drain = async {
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "alert delivery task failed");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(pending = count, "gave up waiting for alert deliveries");
        }
        count
    }

    /// Drop rule state idle for longer than the state TTL. Runs at most once
    /// per [`SWEEP_EVERY_MS`] of frame time, or when the clock jumps back.
    fn sweep_idle_state(&mut self, now_ms: i64) {
        let Some(last) = self.last_sweep_ms else {
            self.last_sweep_ms = Some(now_ms);
            return;
        };
        if now_ms.abs_diff(last) < SWEEP_EVERY_MS {
            return;
        }
        self.last_sweep_ms = Some(now_ms);

        let ttl_ms = self.state_ttl_ms();
        let evicted = self.ledger.evict_stale(now_ms, ttl_ms);
        for rule in &mut self.rules {
            rule.instance.evict_stale(now_ms, ttl_ms);
        }
        if evicted > 0 {
            debug!(evicted, ttl_ms, "evicted idle violation state");
        }
    }

    fn state_ttl_ms(&self) -> u64 {
        let config = &self.config;
        self.settings
            .state_ttl_secs
            .max(config.cooldown)
            .max(config.min_violation_interval)
            .max(config.video_cooldown)
            .saturating_mul(1000)
    }

    /// Evaluate one frame with a standalone instance of `definition`.
    ///
    /// Uses a private ledger and the engine's current global config. Nothing
    /// is persisted or published and the active rules are untouched.
    pub fn dry_run(
        &self,
        definition: &RuleDefinition,
        detections: &[Detection],
        frame: &FrameContext,
    ) -> Result<Option<Violation>, EngineError> {
        let compiled = definition.compile()?;
        let mut instance = variants::build(&compiled, &self.config);
        let mut ledger = MemoryLedger::new();
        let mut ctx = EvalContext::new(frame, &mut ledger);
        Ok(instance.evaluate(detections, &mut ctx)?)
    }
}

/// Clip hints come from the first violation; missing hints use the symmetric default.
pub(crate) fn clip_window(violation: &Violation) -> ClipWindow {
    let first = violation.violations.first();
    let pre = first
        .and_then(|d| d.pre_duration)
        .unwrap_or(ClipWindow::DEFAULT_HALF_SECS);
    let post = first
        .and_then(|d| d.post_duration)
        .unwrap_or(ClipWindow::DEFAULT_HALF_SECS);

    let mut clip = ClipWindow::new(pre, post);
    if violation.rule_type == RuleKind::FallDetection {
        clip.total_secs = FALL_CLIP_TOTAL_SECS;
    }
    clip
}

/// Deliveries run detached; handles are kept so they can be flushed.
fn spawn_publish(
    pending: &mut Vec<JoinHandle<()>>,
    publisher: Arc<dyn AlertPublisher>,
    alert: Alert,
) {
    pending.retain(|handle| !handle.is_finished());
    let handle = tokio::spawn(async move {
        if let Err(e) = publisher.publish(&alert).await {
            warn!(
                alert_id = %alert.alert_id,
                channel = publisher.channel_name(),
                error = %e,
                "failed to publish alert"
            );
        }
    });
    pending.push(handle);
}

async fn record_execution(
    store: &dyn AlertStore,
    rule_id: &str,
    frame: &FrameContext,
    fired: bool,
    details: Option<serde_json::Value>,
) {
    let execution = RuleExecution {
        rule_id: rule_id.to_string(),
        video_id: frame.video_id.clone(),
        frame_number: frame.frame_number,
        timestamp_ms: frame.timestamp_ms,
        fired,
        details,
    };
    if let Err(e) = store.save_rule_execution(&execution).await {
        warn!(rule_id, error = %e, "failed to save rule execution");
    }
}
