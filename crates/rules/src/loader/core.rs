//! Core [`RuleLoader`] struct: filesystem-backed rule loading with optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::schema::RuleDefinition;

use super::error::{LoadResult, LoadStatus, Result, RuleError};
use super::watcher::handle_fs_event;

/// On-disk encoding of a rule definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Json,
    Yaml,
}

impl RuleFormat {
    /// Format implied by a file extension, `None` for anything else.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())? {
            "json" => Some(RuleFormat::Json),
            "yml" | "yaml" => Some(RuleFormat::Yaml),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RuleFormat::Json => "json",
            RuleFormat::Yaml => "yml",
        }
    }

    pub fn parse(&self, contents: &str) -> Result<RuleDefinition> {
        let def: RuleDefinition = match self {
            RuleFormat::Json => serde_json::from_str(contents)?,
            RuleFormat::Yaml => serde_yaml::from_str(contents)?,
        };
        if def.id.trim().is_empty() {
            return Err(RuleError::Validation("rule id must not be empty".to_string()));
        }
        Ok(def)
    }

    pub fn render(&self, def: &RuleDefinition) -> Result<String> {
        Ok(match self {
            RuleFormat::Json => serde_json::to_string_pretty(def)?,
            RuleFormat::Yaml => serde_yaml::to_string(def)?,
        })
    }
}

/// A definition together with the file it was read from.
#[derive(Debug, Clone)]
pub(super) struct StoredRule {
    pub definition: RuleDefinition,
    pub path: PathBuf,
}

pub(super) type RuleMap = Arc<RwLock<HashMap<String, StoredRule>>>;

/// Filesystem-backed rule loader with optional hot-reload.
///
/// Scans a directory (recursively) for `*.json` / `*.yml` / `*.yaml` files,
/// deserializes each into a [`RuleDefinition`], and maintains an in-memory
/// map keyed by rule id.
pub struct RuleLoader {
    rules_dir: PathBuf,
    rules: RuleMap,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            rules: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Recursively scan the rules directory and load all rule files.
    ///
    /// Parse errors are reported per-file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        for entry in entries {
            let path = entry?.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if RuleFormat::from_path(&path).is_none() {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a JSON or YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(definition) => {
                    let rule_id = definition.id.clone();
                    info!(rule_id = %rule_id, rule_type = %definition.rule_type, path = %path.display(), "loaded rule");
                    self.insert(definition, path.clone());
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Loaded { rule_id },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse a single rule file, choosing the format by extension.
    pub fn load_file(&self, path: &Path) -> Result<RuleDefinition> {
        let format = RuleFormat::from_path(path).ok_or_else(|| {
            RuleError::Validation(format!("unsupported rule file: {}", path.display()))
        })?;
        let contents = fs::read_to_string(path)?;
        format.parse(&contents)
    }

    fn insert(&self, definition: RuleDefinition, path: PathBuf) {
        self.rules
            .write()
            .expect("rules lock poisoned")
            .insert(definition.id.clone(), StoredRule { definition, path });
    }

    /// Start a filesystem watcher with 500ms poll interval.
    ///
    /// On file create/modify the rule is re-parsed and upserted.
    /// On file delete the rule is removed from the in-memory map.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let rules = Arc::clone(&self.rules);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &rules),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;
        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.rules_dir.display(), "watching rules directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    pub fn get(&self, id: &str) -> Option<RuleDefinition> {
        let guard = self.rules.read().expect("rules lock poisoned");
        guard.get(id).map(|r| r.definition.clone())
    }

    /// All loaded definitions, sorted by id.
    pub fn snapshot(&self) -> Vec<RuleDefinition> {
        let guard = self.rules.read().expect("rules lock poisoned");
        let mut defs: Vec<RuleDefinition> = guard.values().map(|r| r.definition.clone()).collect();
        defs.sort_by(|a, b| a.id.cmp(&b.id));
        defs
    }

    /// Enabled definitions, sorted by id.
    pub fn enabled_rules(&self) -> Vec<RuleDefinition> {
        self.snapshot().into_iter().filter(|d| d.enabled).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().expect("rules lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically write a rule definition as `{id}.json` or `{id}.yml`.
    ///
    /// Writes to a `.tmp` file first, then renames to the final path to
    /// avoid partial writes on crash.
    pub fn write_rule(&self, def: &RuleDefinition, format: RuleFormat) -> Result<PathBuf> {
        if def.id.trim().is_empty() {
            return Err(RuleError::Validation("rule id must not be empty".to_string()));
        }
        let final_path = self
            .rules_dir
            .join(format!("{}.{}", def.id, format.extension()));
        self.write_atomic(def, format, &final_path)?;
        info!(rule_id = %def.id, rule_type = %def.rule_type, path = %final_path.display(), "wrote rule file");

        self.insert(def.clone(), final_path.clone());
        Ok(final_path)
    }

    fn write_atomic(&self, def: &RuleDefinition, format: RuleFormat, final_path: &Path) -> Result<()> {
        let tmp_path = self.rules_dir.join(format!(".{}.tmp", def.id));
        fs::write(&tmp_path, format.render(def)?)?;
        fs::rename(&tmp_path, final_path)?;
        Ok(())
    }

    /// Toggle a rule and persist it in place, keeping its file format.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<RuleDefinition> {
        let stored = {
            let guard = self.rules.read().expect("rules lock poisoned");
            guard
                .get(id)
                .cloned()
                .ok_or_else(|| RuleError::Validation(format!("no rule loaded with id '{}'", id)))?
        };

        let mut definition = stored.definition;
        definition.enabled = enabled;
        let format = RuleFormat::from_path(&stored.path).unwrap_or(RuleFormat::Json);
        self.write_atomic(&definition, format, &stored.path)?;
        info!(rule_id = %id, enabled, "updated rule");

        self.insert(definition.clone(), stored.path);
        Ok(definition)
    }

    /// Delete a rule file by rule ID.
    ///
    /// Removes both the file and the in-memory entry.
    pub fn delete_rule(&self, id: &str) -> Result<()> {
        let known = {
            let guard = self.rules.read().expect("rules lock poisoned");
            guard.get(id).map(|r| r.path.clone())
        };
        let path = known
            .into_iter()
            .chain(["json", "yml", "yaml"].map(|ext| self.rules_dir.join(format!("{}.{}", id, ext))))
            .find(|p| p.exists())
            .ok_or_else(|| RuleError::Validation(format!("no rule file found for id '{}'", id)))?;

        fs::remove_file(&path)?;
        self.rules.write().expect("rules lock poisoned").remove(id);

        info!(rule_id = %id, path = %path.display(), "deleted rule");
        Ok(())
    }
}
