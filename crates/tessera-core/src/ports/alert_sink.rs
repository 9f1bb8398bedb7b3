//! AlertSink port: operator notifications.

use async_trait::async_trait;

/// Fire-and-forget. Implementations swallow their own delivery failures so
/// that alerting can never fail a task.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, subject: &str, message: &str);
}
