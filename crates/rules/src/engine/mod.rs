//! Frame orchestration: runs every active rule, deduplicates against
//! persisted history, persists and publishes the resulting alerts.
//!
//! Collaborators are injected as trait objects:
//! - [`RuleSource`] supplies rule definitions and the global config
//! - [`AlertStore`](crate::store::AlertStore) persists alerts and the execution audit trail
//! - [`AlertPublisher`](safevision_notify::AlertPublisher) delivers alerts, fire-and-forget

mod core;
mod error;
mod source;

#[cfg(test)]
mod tests;

pub use self::core::{EngineSettings, ReloadReport, RuleEngine, RuleInfo, SkippedRule};
pub use self::error::EngineError;
pub use self::source::{RuleSource, StaticRuleSource};
