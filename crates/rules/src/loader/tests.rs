//! Tests for the rule loader module.

use std::fs;

use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind};
use tempfile::TempDir;

use super::core::StoredRule;
use super::watcher::{handle_fs_event, remove_rule_by_path};
use super::*;
use crate::engine::RuleSource;
use crate::schema::RuleDefinition;

const ZONE_RULE_YAML: &str = r#"
id: dock-intrusion
name: Loading dock intrusion
type: zone_entry
severity: high
params:
  duration: 2
zone:
  id: dock
  name: Loading Dock
  polygon: [[400, 50], [800, 50], [800, 150], [400, 150]]
"#;

const DISTANCE_RULE_JSON: &str = r#"{
  "id": "forklift-proximity",
  "name": "Forklift proximity",
  "type": "distance_below",
  "enabled": false,
  "params": {"min_distance": 1.5, "duration": 3}
}"#;

fn temp_loader() -> (TempDir, RuleLoader) {
    let dir = TempDir::new().expect("create tempdir");
    let loader = RuleLoader::new(dir.path().to_path_buf());
    (dir, loader)
}

#[test]
fn load_rule_from_yaml_and_json() {
    let (dir, loader) = temp_loader();
    let yaml_path = dir.path().join("dock.yml");
    let json_path = dir.path().join("proximity.json");
    fs::write(&yaml_path, ZONE_RULE_YAML).unwrap();
    fs::write(&json_path, DISTANCE_RULE_JSON).unwrap();

    let zone = loader.load_file(&yaml_path).unwrap();
    assert_eq!(zone.id, "dock-intrusion");
    assert_eq!(zone.zone.as_ref().unwrap().polygon.len(), 4);

    let dist = loader.load_file(&json_path).unwrap();
    assert_eq!(dist.rule_type, "distance_below");
    assert!(!dist.enabled);
}

#[test]
fn load_all_skips_dotfiles_and_other_extensions() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("dock.yml"), ZONE_RULE_YAML).unwrap();
    fs::write(dir.path().join(".hidden.yml"), ZONE_RULE_YAML).unwrap();
    fs::write(dir.path().join("readme.txt"), "not a rule").unwrap();

    let results = loader.load_all().unwrap();
    let loaded = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
        .count();
    let skipped = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
        .count();

    assert_eq!(loaded, 1);
    assert_eq!(skipped, 2);
    assert!(loader.get("dock-intrusion").is_some());
}

#[test]
fn load_all_recursive_subdirectories() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("dock.yml"), ZONE_RULE_YAML).unwrap();
    let sub = dir.path().join("site-b");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("proximity.json"), DISTANCE_RULE_JSON).unwrap();

    loader.load_all().unwrap();
    let ids: Vec<String> = loader.snapshot().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["dock-intrusion", "forklift-proximity"]);
}

#[test]
fn parse_failure_does_not_abort_the_scan() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("no-id.yml"), "id: ''\ntype: zone_entry\n").unwrap();
    fs::write(dir.path().join("dock.yml"), ZONE_RULE_YAML).unwrap();

    let results = loader.load_all().unwrap();
    let failed = results
        .iter()
        .filter(|r| matches!(r.status, LoadStatus::Failed { .. }))
        .count();
    assert_eq!(failed, 2);
    assert_eq!(loader.len(), 1);
}

#[test]
fn enabled_rules_filters_disabled() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("dock.yml"), ZONE_RULE_YAML).unwrap();
    fs::write(dir.path().join("proximity.json"), DISTANCE_RULE_JSON).unwrap();
    loader.load_all().unwrap();

    let enabled: Vec<String> = loader.enabled_rules().into_iter().map(|d| d.id).collect();
    assert_eq!(enabled, vec!["dock-intrusion"]);
}

#[test]
fn write_rule_is_atomic_and_reloadable() {
    let (dir, loader) = temp_loader();
    let def = RuleDefinition::new("crowd-a", "crowd_in_zone")
        .with_params(serde_json::json!({"max_count": 4}));

    let path = loader.write_rule(&def, RuleFormat::Yaml).unwrap();
    assert_eq!(path, dir.path().join("crowd-a.yml"));
    assert!(!dir.path().join(".crowd-a.tmp").exists());

    let reread = loader.load_file(&path).unwrap();
    assert_eq!(reread, def);
    assert_eq!(loader.get("crowd-a"), Some(def));
}

#[test]
fn set_enabled_persists_in_original_format() {
    let (dir, loader) = temp_loader();
    let path = dir.path().join("proximity.json");
    fs::write(&path, DISTANCE_RULE_JSON).unwrap();
    loader.load_all().unwrap();

    let updated = loader.set_enabled("forklift-proximity", true).unwrap();
    assert!(updated.enabled);

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["enabled"], true);
    assert!(loader.set_enabled("missing", true).is_err());
}

#[test]
fn delete_rule_removes_file_and_entry() {
    let (dir, loader) = temp_loader();
    fs::write(dir.path().join("dock.yml"), ZONE_RULE_YAML).unwrap();
    loader.load_all().unwrap();

    loader.delete_rule("dock-intrusion").unwrap();
    assert!(!dir.path().join("dock.yml").exists());
    assert!(loader.is_empty());
    assert!(matches!(
        loader.delete_rule("dock-intrusion"),
        Err(RuleError::Validation(_))
    ));
}

#[test]
fn watcher_events_upsert_and_remove() {
    let dir = TempDir::new().unwrap();
    let rules = std::sync::Arc::new(std::sync::RwLock::new(std::collections::HashMap::new()));
    let path = dir.path().join("dock.yml");
    fs::write(&path, ZONE_RULE_YAML).unwrap();

    let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
    handle_fs_event(&created, &rules);
    assert!(rules.read().unwrap().contains_key("dock-intrusion"));

    // a broken edit keeps the previous version
    fs::write(&path, "id: [").unwrap();
    handle_fs_event(&created, &rules);
    let guard = rules.read().unwrap();
    let stored: &StoredRule = guard.get("dock-intrusion").unwrap();
    assert_eq!(stored.definition.rule_type, "zone_entry");
    drop(guard);

    let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
    handle_fs_event(&removed, &rules);
    assert!(rules.read().unwrap().is_empty());
    assert_eq!(remove_rule_by_path(&rules, &path), None);
}

#[test]
fn file_source_reads_config_or_falls_back() {
    let dir = TempDir::new().unwrap();
    let rules_dir = dir.path().join("rules");
    fs::create_dir(&rules_dir).unwrap();
    fs::write(rules_dir.join("dock.yml"), ZONE_RULE_YAML).unwrap();

    let config_path = dir.path().join("config.yml");
    let source = FileRuleSource::open(rules_dir.clone(), Some(config_path.clone())).unwrap();
    assert_eq!(source.global_config().unwrap().cooldown, 60);
    assert_eq!(source.enabled_rules().unwrap().len(), 1);

    fs::write(&config_path, "cooldown: 15\npixel_to_meter: 0.02\n").unwrap();
    let cfg = source.global_config().unwrap();
    assert_eq!(cfg.cooldown, 15);
    assert_eq!(cfg.pixel_to_meter, 0.02);

    fs::write(&config_path, "pixel_to_meter: -1\n").unwrap();
    assert!(matches!(source.global_config(), Err(RuleError::Config(_))));
}
