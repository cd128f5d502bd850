use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// Outbound patient messaging (mail, SMS).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the message was accepted for delivery.
    async fn notify(&self, event: &str, payload: &Value) -> bool;
}

/// Records notifications in the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &str, payload: &Value) -> bool {
        info!(notification = event, "Notification: {}", payload);
        true
    }
}
