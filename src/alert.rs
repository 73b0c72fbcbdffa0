use serde::Serialize;
use tokio::sync::mpsc;

use crate::resource::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertReason {
    /// Drift on a protected field, region move or missing protected resource.
    PolicyViolation,
    /// Correction failed after all retries.
    CorrectionFailed,
    FetchFailed,
    DestroyRefused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub resource: ResourceId,
    pub reason: AlertReason,
    pub message: String,
}

/// Hook for an external notifier. Called from reconciliation tasks, so it
/// must not block.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Emits alerts as `warn` events.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: Alert) {
        tracing::warn!(
            resource = %alert.resource,
            reason = ?alert.reason,
            "ALERT: {}",
            alert.message
        );
    }
}

/// Forwards alerts to a channel consumer.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn alert(&self, alert: Alert) {
        if self.tx.send(alert).is_err() {
            tracing::error!("alert receiver dropped; alert lost");
        }
    }
}
