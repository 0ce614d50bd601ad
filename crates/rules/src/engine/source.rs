//! Where the engine reads rule definitions and the global config from.

use std::sync::RwLock;

use safevision_core::GlobalConfig;

use crate::loader::Result;
use crate::schema::RuleDefinition;

/// Read side of rule configuration. Called on every [`reload`].
///
/// [`reload`]: super::RuleEngine::reload
pub trait RuleSource: Send + Sync {
    /// Enabled definitions in evaluation order.
    fn enabled_rules(&self) -> Result<Vec<RuleDefinition>>;

    fn global_config(&self) -> Result<GlobalConfig>;
}

/// In-memory [`RuleSource`] for embedding and tests.
pub struct StaticRuleSource {
    rules: RwLock<Vec<RuleDefinition>>,
    config: RwLock<GlobalConfig>,
}

impl StaticRuleSource {
    pub fn new(rules: Vec<RuleDefinition>, config: GlobalConfig) -> Self {
        Self {
            rules: RwLock::new(rules),
            config: RwLock::new(config),
        }
    }

    pub fn set_rules(&self, rules: Vec<RuleDefinition>) {
        *self.rules.write().expect("rules lock poisoned") = rules;
    }

    pub fn set_config(&self, config: GlobalConfig) {
        *self.config.write().expect("config lock poisoned") = config;
    }
}

impl RuleSource for StaticRuleSource {
    fn enabled_rules(&self) -> Result<Vec<RuleDefinition>> {
        let guard = self.rules.read().expect("rules lock poisoned");
        Ok(guard.iter().filter(|d| d.enabled).cloned().collect())
    }

    fn global_config(&self) -> Result<GlobalConfig> {
        Ok(self.config.read().expect("config lock poisoned").clone())
    }
}
