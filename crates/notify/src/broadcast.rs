//! In-process fan-out of alerts to live subscribers (e.g. an SSE endpoint).
//!
//! Slow subscribers lag and lose the oldest events; they never block the
//! publisher.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use safevision_core::Alert;

use crate::traits::{AlertPublisher, NotifyError};

/// Envelope pushed to every subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub event_type: String,
    pub data: Alert,
    /// RFC 3339 wall-clock time at which the event was broadcast.
    pub timestamp: String,
}

/// Broadcasts alerts to any number of in-process receivers.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<AlertEvent>,
}

impl BroadcastPublisher {
    /// Create a publisher whose per-subscriber buffer holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Open a new subscription. Only events published afterwards are received.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.sender.subscribe()
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait::async_trait]
impl AlertPublisher for BroadcastPublisher {
    async fn publish(&self, alert: &Alert) -> Result<(), NotifyError> {
        let event = AlertEvent {
            event_type: "alert".to_string(),
            data: alert.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };

        // A send error only means nobody is listening right now.
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(alert_id = %alert.alert_id, receivers, "alert broadcast");
            }
            Err(_) => {
                tracing::debug!(alert_id = %alert.alert_id, "alert broadcast with no subscribers");
            }
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "broadcast"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safevision_core::{ClipWindow, FrameContext, RuleKind, Severity, Violation};

    fn sample_alert() -> Alert {
        let violation = Violation {
            rule_id: "rule-1".to_string(),
            rule_type: RuleKind::LineCross,
            violations: vec![],
            summary: "line crossed".to_string(),
        };
        Alert::from_violation(
            violation,
            &FrameContext::new("video-1", 10, 1_000),
            Severity::Critical,
            ClipWindow::default(),
        )
    }

    #[tokio::test]
    async fn subscribers_receive_published_alert() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx_a = publisher.subscribe();
        let mut rx_b = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        let alert = sample_alert();
        publisher.publish(&alert).await.unwrap();

        let a = rx_a.recv().await.unwrap();
        let b = rx_b.recv().await.unwrap();
        assert_eq!(a.event_type, "alert");
        assert_eq!(a.data.alert_id, alert.alert_id);
        assert_eq!(b.data.alert_id, alert.alert_id);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::default();
        assert!(publisher.publish(&sample_alert()).await.is_ok());
    }
}
