//! Filesystem rule loader with hot-reload via `notify` watcher.
//!
//! Watches the rules directory for JSON / YAML rule definitions (create,
//! modify, delete) and keeps an in-memory map of [`RuleDefinition`]s keyed
//! by rule id. Definitions are only parsed here; compilation into runnable
//! rules happens when the engine reloads.
//!
//! [`RuleDefinition`]: crate::schema::RuleDefinition

mod core;
mod error;
mod source;
mod watcher;

#[cfg(test)]
mod tests;

pub use self::core::{RuleFormat, RuleLoader};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
pub use self::source::FileRuleSource;
