//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;
use std::path::Path;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::core::{RuleFormat, RuleMap, StoredRule};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, rules: &RuleMap) {
    for path in &event.paths {
        let Some(format) = RuleFormat::from_path(path) else {
            continue;
        };

        // Skip dotfiles (including our .tmp files)
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => upsert_from_file(rules, path, format),
            EventKind::Remove(RemoveKind::File) => {
                remove_rule_by_path(rules, path);
            }
            _ => {}
        }
    }
}

fn upsert_from_file(rules: &RuleMap, path: &Path, format: RuleFormat) {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read file during hot-reload");
            return;
        }
    };

    match format.parse(&contents) {
        Ok(definition) => {
            let rule_id = definition.id.clone();
            info!(rule_id = %rule_id, rule_type = %definition.rule_type, path = %path.display(), "hot-reloaded rule");
            let mut guard = rules.write().expect("rules lock poisoned");
            // A file renamed to a new id must not leave its old entry behind.
            guard.retain(|id, stored| id == &rule_id || stored.path != path);
            guard.insert(
                rule_id,
                StoredRule {
                    definition,
                    path: path.to_path_buf(),
                },
            );
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to parse rule during hot-reload, keeping previous version"
            );
        }
    }
}

/// Remove whichever rule was loaded from `path`.
pub(super) fn remove_rule_by_path(rules: &RuleMap, path: &Path) -> Option<String> {
    let mut guard = rules.write().expect("rules lock poisoned");
    let id = guard
        .iter()
        .find(|(_, stored)| stored.path == path)
        .map(|(id, _)| id.clone())?;
    guard.remove(&id);
    info!(rule_id = %id, path = %path.display(), "removed rule after file deletion");
    Some(id)
}
