//! Fans an alert out to several publishers.
//!
//! Individual channel failures don't block other channels.

use safevision_core::Alert;

use crate::traits::{AlertPublisher, DispatchResult, NotifyError};

/// Dispatches alerts to every configured channel in order.
#[derive(Default)]
pub struct Dispatcher {
    channels: Vec<Box<dyn AlertPublisher>>,
}

impl Dispatcher {
    /// Create a dispatcher over the given channels.
    pub fn new(channels: Vec<Box<dyn AlertPublisher>>) -> Self {
        Self { channels }
    }

    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a channel.
    pub fn add_channel(&mut self, channel: Box<dyn AlertPublisher>) {
        self.channels.push(channel);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Publish an alert to all channels, returning one result per channel.
    pub async fn dispatch(&self, alert: &Alert) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!(alert_id = %alert.alert_id, "No alert channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.publish(alert).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::info!(
                        alert_id = %alert.alert_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Alert delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        alert_id = %alert.alert_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Alert delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                alert_id: alert.alert_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

#[async_trait::async_trait]
impl AlertPublisher for Dispatcher {
    /// Succeeds when at least one channel delivered (or none are configured).
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        let results = self.dispatch(alert).await;
        if results.is_empty() || results.iter().any(|r| r.success) {
            return Ok(());
        }
        let errors: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.error.map(|e| format!("{}: {}", r.channel, e)))
            .collect();
        Err(NotifyError::Channel(errors.join("; ")))
    }

    fn channel_name(&self) -> &str {
        "dispatcher"
    }
}
