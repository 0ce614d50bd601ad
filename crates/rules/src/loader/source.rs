//! [`RuleSource`] backed by a rules directory and a global-config file.

use std::path::PathBuf;

use tracing::info;

use safevision_core::GlobalConfig;

use crate::engine::RuleSource;
use crate::schema::RuleDefinition;

use super::core::RuleLoader;
use super::error::{LoadStatus, Result};

pub struct FileRuleSource {
    loader: RuleLoader,
    config_path: Option<PathBuf>,
    fallback: GlobalConfig,
}

impl FileRuleSource {
    /// Scan `rules_dir` once. `config_path` is read on every
    /// [`RuleSource::global_config`] call so edits apply on the next reload.
    pub fn open(rules_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let loader = RuleLoader::new(rules_dir);
        let results = loader.load_all()?;
        let loaded = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
            .count();
        info!(loaded, path = %loader.rules_dir().display(), "loaded rule definitions");
        Ok(Self {
            loader,
            config_path,
            fallback: GlobalConfig::default(),
        })
    }

    /// Config used when no config file is present.
    pub fn with_fallback_config(mut self, config: GlobalConfig) -> Self {
        self.fallback = config;
        self
    }

    /// Keep the rule set in sync with the directory.
    pub fn watch(&mut self) -> Result<()> {
        self.loader.watch()
    }

    pub fn loader(&self) -> &RuleLoader {
        &self.loader
    }
}

impl RuleSource for FileRuleSource {
    fn enabled_rules(&self) -> Result<Vec<RuleDefinition>> {
        Ok(self.loader.enabled_rules())
    }

    fn global_config(&self) -> Result<GlobalConfig> {
        match &self.config_path {
            Some(path) if path.exists() => Ok(GlobalConfig::from_file(path)?),
            _ => Ok(self.fallback.clone()),
        }
    }
}
