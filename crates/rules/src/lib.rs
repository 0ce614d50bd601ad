//! Safety rule evaluation engine for video object detections.
//!
//! This crate provides:
//! - JSON / YAML rule definitions compiled into typed rule specs at load time
//! - Filesystem loader with hot-reload via `notify` watcher
//! - Eight safety rule policies (proximity, zones, speed, crowding, line
//!   crossing, sustained motion, collision risk, falls)
//! - Violation timers and suppression clocks keyed by rule and entity
//! - The frame engine: evaluate, dedup, persist, publish

pub mod engine;
pub mod geometry;
pub mod ledger;
pub mod loader;
pub mod schema;
pub mod store;
pub mod tracking;
pub mod variants;
