//! Publisher trait definition and shared error types.

use std::sync::Arc;

use safevision_core::Alert;

/// Errors that can occur during alert delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Channel delivery failed: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Trait for alert delivery channels.
///
/// The engine calls `publish` fire-and-forget: failures are logged by the
/// caller and never reach the frame pipeline.
#[async_trait::async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Deliver an alert through this channel.
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "broadcast").
    fn channel_name(&self) -> &str;
}

/// Blanket implementation so `Arc<dyn AlertPublisher>` can be used directly.
#[async_trait::async_trait]
impl<T: AlertPublisher + ?Sized> AlertPublisher for Arc<T> {
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        (**self).publish(alert).await
    }

    fn channel_name(&self) -> &str {
        (**self).channel_name()
    }
}

/// Publisher that drops every alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait::async_trait]
impl AlertPublisher for NoopPublisher {
    async fn publish(&self, _alert: &Alert) -> Result<(), NotifyError> {
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "noop"
    }
}

/// Result of publishing an alert to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub alert_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
