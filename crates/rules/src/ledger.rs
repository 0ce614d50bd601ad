//! Violation timers and alert suppression clocks.
//!
//! All times are frame times in milliseconds, never wall-clock, so a replayed
//! stream drives the exact same state transitions.
//!
//! Storage sits behind [`ViolationLedger`] so the engine can keep it across
//! rule reloads and an external store can share it between processes.
//! [`MemoryLedger`] is the process-local implementation.

use std::collections::HashMap;

use tracing::debug;

use safevision_core::GlobalConfig;

// ── Storage ──────────────────────────────────────────────────────────

/// Start of a predicate streak for one (rule, entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationTimer {
    pub started_ms: i64,
    /// Last frame time at which the predicate was observed true.
    pub last_seen_ms: i64,
    /// Set once an alert fired for this streak. Cleared only with the timer.
    pub fired: bool,
}

impl ViolationTimer {
    pub fn started_at(started_ms: i64) -> Self {
        Self {
            started_ms,
            last_seen_ms: started_ms,
            fired: false,
        }
    }
}

/// Keyed storage for timers and the three suppression clocks.
///
/// Calls are synchronous and happen inside rule evaluation.
pub trait ViolationLedger: Send {
    fn timer(&self, rule_id: &str, entity_key: &str) -> Option<ViolationTimer>;
    fn set_timer(&mut self, rule_id: &str, entity_key: &str, timer: ViolationTimer);
    fn clear_timer(&mut self, rule_id: &str, entity_key: &str);

    /// Last emission of any alert by the rule.
    fn last_rule_alert(&self, rule_id: &str) -> Option<i64>;
    /// Last emission for one entity of the rule.
    fn last_entity_alert(&self, rule_id: &str, entity_key: &str) -> Option<i64>;
    /// Last emission of the rule within one video.
    fn last_video_alert(&self, rule_id: &str, video_id: &str) -> Option<i64>;

    /// Stamp all three clocks for an emitted alert.
    fn record_alert(&mut self, rule_id: &str, entity_key: &str, video_id: &str, at_ms: i64);

    /// Drop timers and clocks last touched more than `max_idle_ms` away from
    /// `now_ms`, in either direction. Returns how many entries were removed.
    ///
    /// Shared implementations may expire entries on their own and keep the
    /// default no-op.
    fn evict_stale(&mut self, now_ms: i64, max_idle_ms: u64) -> usize {
        let _ = (now_ms, max_idle_ms);
        0
    }
}

/// Process-local [`ViolationLedger`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    timers: HashMap<(String, String), ViolationTimer>,
    rule_alerts: HashMap<String, i64>,
    entity_alerts: HashMap<(String, String), i64>,
    video_alerts: HashMap<(String, String), i64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live timers across all rules.
    pub fn active_timers(&self) -> usize {
        self.timers.len()
    }

    /// Timers plus stamped clocks.
    pub fn len(&self) -> usize {
        self.timers.len() + self.rule_alerts.len() + self.entity_alerts.len() + self.video_alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

impl ViolationLedger for MemoryLedger {
    fn timer(&self, rule_id: &str, entity_key: &str) -> Option<ViolationTimer> {
        self.timers.get(&key(rule_id, entity_key)).copied()
    }

    fn set_timer(&mut self, rule_id: &str, entity_key: &str, timer: ViolationTimer) {
        self.timers.insert(key(rule_id, entity_key), timer);
    }

    fn clear_timer(&mut self, rule_id: &str, entity_key: &str) {
        self.timers.remove(&key(rule_id, entity_key));
    }

    fn last_rule_alert(&self, rule_id: &str) -> Option<i64> {
        self.rule_alerts.get(rule_id).copied()
    }

    fn last_entity_alert(&self, rule_id: &str, entity_key: &str) -> Option<i64> {
        self.entity_alerts.get(&key(rule_id, entity_key)).copied()
    }

    fn last_video_alert(&self, rule_id: &str, video_id: &str) -> Option<i64> {
        self.video_alerts.get(&key(rule_id, video_id)).copied()
    }

    fn record_alert(&mut self, rule_id: &str, entity_key: &str, video_id: &str, at_ms: i64) {
        self.rule_alerts.insert(rule_id.to_string(), at_ms);
        self.entity_alerts.insert(key(rule_id, entity_key), at_ms);
        self.video_alerts.insert(key(rule_id, video_id), at_ms);
    }

    fn evict_stale(&mut self, now_ms: i64, max_idle_ms: u64) -> usize {
        let before = self.len();
        let live = |at: i64| at.abs_diff(now_ms) <= max_idle_ms;
        self.timers.retain(|_, t| live(t.last_seen_ms));
        self.rule_alerts.retain(|_, at| live(*at));
        self.entity_alerts.retain(|_, at| live(*at));
        self.video_alerts.retain(|_, at| live(*at));
        before - self.len()
    }
}

// ── Duration accrual ─────────────────────────────────────────────────

/// Where a (rule, entity) streak stands after observing a true predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accrual {
    /// Timer running, duration not reached yet.
    Pending { elapsed_secs: f64 },
    /// Duration reached and no alert fired yet for this streak.
    Matured { elapsed_secs: f64 },
    /// Already alerted; waits for the predicate to go false.
    Latched,
}

/// Record that the predicate holds for `entity_key` at `now_ms`.
///
/// A missing timer is started and reports `Pending`, so the first frame of a
/// streak is never eligible. Frame time earlier than the streak start (a new
/// video restarting its clock) starts the streak over.
pub fn accrue(
    ledger: &mut dyn ViolationLedger,
    rule_id: &str,
    entity_key: &str,
    now_ms: i64,
    duration_secs: f64,
) -> Accrual {
    let mut timer = match ledger.timer(rule_id, entity_key) {
        Some(timer) if now_ms >= timer.started_ms => timer,
        _ => {
            ledger.set_timer(rule_id, entity_key, ViolationTimer::started_at(now_ms));
            return Accrual::Pending { elapsed_secs: 0.0 };
        }
    };

    timer.last_seen_ms = now_ms;
    ledger.set_timer(rule_id, entity_key, timer);
    if timer.fired {
        return Accrual::Latched;
    }

    let elapsed_secs = (now_ms - timer.started_ms) as f64 / 1000.0;
    if elapsed_secs < duration_secs {
        Accrual::Pending { elapsed_secs }
    } else {
        Accrual::Matured { elapsed_secs }
    }
}

/// Latch the streak so it cannot alert again until re-armed.
pub fn mark_fired(ledger: &mut dyn ViolationLedger, rule_id: &str, entity_key: &str) {
    if let Some(mut timer) = ledger.timer(rule_id, entity_key) {
        timer.fired = true;
        ledger.set_timer(rule_id, entity_key, timer);
    }
}

/// Predicate went false: drop the streak with no carried credit.
pub fn clear(ledger: &mut dyn ViolationLedger, rule_id: &str, entity_key: &str) {
    ledger.clear_timer(rule_id, entity_key);
}

// ── Suppression ──────────────────────────────────────────────────────

/// Which clock blocked an otherwise eligible alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    RuleCooldown,
    EntityInterval,
    VideoWindow,
}

/// Windows of the three suppression clocks, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionPolicy {
    pub cooldown_ms: i64,
    pub min_interval_ms: i64,
    pub video_cooldown_ms: i64,
}

impl SuppressionPolicy {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            cooldown_ms: secs_to_ms(config.cooldown),
            min_interval_ms: secs_to_ms(config.min_violation_interval),
            video_cooldown_ms: secs_to_ms(config.video_cooldown),
        }
    }

    /// Clock 1 only, as used by instantaneous-trigger rules.
    pub fn rule_cooldown_elapsed(
        &self,
        ledger: &dyn ViolationLedger,
        rule_id: &str,
        now_ms: i64,
    ) -> bool {
        within(ledger.last_rule_alert(rule_id), now_ms, self.cooldown_ms).is_none()
    }

    /// Clocks 1 to 3 in order, as used by duration-accrual rules.
    ///
    /// Only consulted for a matured streak that has not fired yet, so the
    /// per-entity interval is halved on every frame of that streak.
    pub fn check(
        &self,
        ledger: &dyn ViolationLedger,
        rule_id: &str,
        entity_key: &str,
        video_id: &str,
        now_ms: i64,
    ) -> Result<(), Suppressed> {
        if let Some(since) = within(ledger.last_rule_alert(rule_id), now_ms, self.cooldown_ms) {
            debug!(rule_id, since_ms = since, "suppressed by rule cooldown");
            return Err(Suppressed::RuleCooldown);
        }

        let interval = self.min_interval_ms / 2;
        if let Some(since) = within(ledger.last_entity_alert(rule_id, entity_key), now_ms, interval) {
            debug!(rule_id, entity_key, since_ms = since, "suppressed by entity interval");
            return Err(Suppressed::EntityInterval);
        }

        if let Some(since) = within(
            ledger.last_video_alert(rule_id, video_id),
            now_ms,
            self.video_cooldown_ms,
        ) {
            debug!(rule_id, video_id, since_ms = since, "suppressed by video window");
            return Err(Suppressed::VideoWindow);
        }

        Ok(())
    }
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self::from_config(&GlobalConfig::default())
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

/// Milliseconds since `last` when that is still inside `window_ms`.
///
/// A stamp later than `now_ms` belongs to another timeline and never blocks.
fn within(last: Option<i64>, now_ms: i64, window_ms: i64) -> Option<i64> {
    let since = now_ms - last?;
    (0..window_ms).contains(&since).then_some(since)
}
