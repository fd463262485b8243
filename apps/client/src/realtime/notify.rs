//! UI reactions to inbound notifications.

use serde_json::Value;
use tracing::info;

/// Receives deliveries from the notification channel.
///
/// Implementations must not block: they run on the channel's reader task.
pub trait NotificationSink: Send + Sync {
    /// An event published on the notifications topic.
    fn on_notification(&self, notification: Value);

    /// A `like` command pushed by the server.
    fn on_like(&self, payload: Value);
}

/// Sink that only logs, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl NotificationSink for LoggingSink {
    fn on_notification(&self, notification: Value) {
        info!(%notification, "[NOTIFY] notification received");
    }

    fn on_like(&self, payload: Value) {
        info!(%payload, "[NOTIFY] board liked");
    }
}
