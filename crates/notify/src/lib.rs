//! Alert publishing for the safety rule engine.
//!
//! This crate provides:
//! - `AlertPublisher` trait for pluggable delivery channels
//! - In-process broadcast fan-out for live alert streams
//! - HTTP webhook publisher
//! - Dispatcher that fans an alert out to several channels

pub mod broadcast;
pub mod dispatcher;
pub mod traits;
pub mod webhook;

pub use broadcast::{AlertEvent, BroadcastPublisher};
pub use dispatcher::Dispatcher;
pub use traits::{AlertPublisher, DispatchResult, NoopPublisher, NotifyError};
pub use webhook::WebhookPublisher;
