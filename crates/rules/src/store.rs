//! Alert persistence and the rule-execution audit trail.
//!
//! [`AlertStore`] is the seam to whatever database backs the deployment.
//! [`MemoryAlertStore`] keeps everything in capped deques with FIFO eviction.
//! It uses `std::sync::RwLock` so it can be read from both async and sync
//! contexts; no lock is held across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;

use safevision_core::{Alert, AlertStatus, RuleExecution, RuleKind};

pub const DEFAULT_MAX_ALERTS: usize = 10_000;
pub const DEFAULT_MAX_EXECUTIONS_PER_RULE: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("alert not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn save_rule_execution(&self, execution: &RuleExecution) -> Result<(), StoreError>;

    /// Whether an alert of `rule_type` for `video_id` was stored less than
    /// `window_secs` before the frame time `at_ms`.
    async fn is_alert_cooldown_active(
        &self,
        video_id: &str,
        rule_type: RuleKind,
        window_secs: u64,
        at_ms: i64,
    ) -> Result<bool, StoreError>;
}

/// In-process [`AlertStore`].
pub struct MemoryAlertStore {
    alerts: RwLock<VecDeque<Alert>>,
    executions: RwLock<HashMap<String, VecDeque<RuleExecution>>>,
    max_alerts: usize,
    max_executions_per_rule: usize,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ALERTS, DEFAULT_MAX_EXECUTIONS_PER_RULE)
    }

    pub fn with_capacity(max_alerts: usize, max_executions_per_rule: usize) -> Self {
        Self {
            alerts: RwLock::new(VecDeque::new()),
            executions: RwLock::new(HashMap::new()),
            max_alerts,
            max_executions_per_rule,
        }
    }

    /// All stored alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        let guard = self.alerts.read().expect("alerts lock poisoned");
        guard.iter().cloned().collect()
    }

    pub fn alerts_for_video(&self, video_id: &str) -> Vec<Alert> {
        let guard = self.alerts.read().expect("alerts lock poisoned");
        guard
            .iter()
            .filter(|a| a.video_id == video_id)
            .cloned()
            .collect()
    }

    /// Execution records for one rule, newest first.
    pub fn executions(&self, rule_id: &str) -> Vec<RuleExecution> {
        let guard = self.executions.read().expect("executions lock poisoned");
        let Some(deque) = guard.get(rule_id) else {
            return Vec::new();
        };
        deque.iter().rev().cloned().collect()
    }

    pub fn update_status(&self, alert_id: &str, status: AlertStatus) -> Result<(), StoreError> {
        let mut guard = self.alerts.write().expect("alerts lock poisoned");
        let alert = guard
            .iter_mut()
            .find(|a| a.alert_id == alert_id)
            .ok_or_else(|| StoreError::NotFound(alert_id.to_string()))?;
        alert.status = status;
        Ok(())
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut guard = self.alerts.write().expect("alerts lock poisoned");
        guard.push_back(alert.clone());
        while guard.len() > self.max_alerts {
            guard.pop_front();
        }
        Ok(())
    }

    async fn save_rule_execution(&self, execution: &RuleExecution) -> Result<(), StoreError> {
        let mut guard = self.executions.write().expect("executions lock poisoned");
        let deque = guard.entry(execution.rule_id.clone()).or_default();
        deque.push_back(execution.clone());
        while deque.len() > self.max_executions_per_rule {
            deque.pop_front();
        }
        Ok(())
    }

    async fn is_alert_cooldown_active(
        &self,
        video_id: &str,
        rule_type: RuleKind,
        window_secs: u64,
        at_ms: i64,
    ) -> Result<bool, StoreError> {
        let window_ms = i64::try_from(window_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let guard = self.alerts.read().expect("alerts lock poisoned");
        let latest = guard
            .iter()
            .rev()
            .find(|a| a.video_id == video_id && a.rule_type == rule_type);
        Ok(latest.is_some_and(|a| (0..window_ms).contains(&(at_ms - a.ts_ms))))
    }
}
