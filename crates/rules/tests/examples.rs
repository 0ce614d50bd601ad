//! Integration tests that verify every example rule in `data/rules/examples/`
//! loads and compiles, and that the example config is valid.

use std::path::PathBuf;

use safevision_core::{GlobalConfig, RuleKind, Severity};
use safevision_rules::loader::{LoadStatus, RuleLoader};
use safevision_rules::schema::RuleSpec;

/// Integration tests run from the crate directory, so we go up two levels.
fn data_dir() -> PathBuf {
    let manifest = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../data/rules")
}

fn loader() -> RuleLoader {
    let loader = RuleLoader::new(data_dir().join("examples"));
    let results = loader.load_all().expect("scan examples");
    for r in &results {
        if let LoadStatus::Failed { error } = &r.status {
            panic!("{} failed to load: {}", r.path.display(), error);
        }
    }
    loader
}

#[test]
fn every_example_compiles() {
    let loader = loader();
    let defs = loader.snapshot();
    assert_eq!(defs.len(), 8);

    let mut kinds: Vec<RuleKind> = defs
        .iter()
        .map(|d| d.compile().unwrap_or_else(|e| panic!("{e}")).kind())
        .collect();
    kinds.sort_by_key(|k| k.as_str());
    let mut all = RuleKind::ALL.to_vec();
    all.sort_by_key(|k| k.as_str());
    assert_eq!(kinds, all, "one example per rule type");
}

#[test]
fn zone_example_carries_geometry() {
    let def = loader().get("loading-dock-intrusion").unwrap();
    assert_eq!(def.severity, Severity::Critical);
    match def.compile().unwrap().spec {
        RuleSpec::ZoneEntry { zone, params } => {
            assert_eq!(zone.id, "loading-dock");
            assert_eq!(zone.polygon.len(), 4);
            assert_eq!(params.duration, 2.0);
        }
        other => panic!("unexpected spec {other:?}"),
    }
}

#[test]
fn line_example_reduces_to_segment() {
    let def = loader().get("yellow-line").unwrap();
    match def.compile().unwrap().spec {
        RuleSpec::LineCross { line, .. } => {
            assert_eq!(line.start, (0.0, 400.0));
            assert_eq!(line.end, (1280.0, 400.0));
        }
        other => panic!("unexpected spec {other:?}"),
    }
}

#[test]
fn example_config_matches_defaults() {
    let cfg = GlobalConfig::from_file(&data_dir().join("config.yml")).unwrap();
    assert_eq!(cfg, GlobalConfig::default());
}
