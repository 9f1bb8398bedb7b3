//! AlertSink implementations.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::error;

use crate::ports::AlertSink;

/// Writes alerts to the log at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, subject: &str, message: &str) {
        error!(alert = subject, "{message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: String,
    pub message: String,
}

/// Keeps every alert in memory, optionally forwarding to another sink.
#[derive(Clone, Default)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
    forward: Option<Arc<dyn AlertSink>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding_to(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            alerts: Arc::default(),
            forward: Some(sink),
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, subject: &str, message: &str) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Alert {
                subject: subject.to_string(),
                message: message.to_string(),
            });
        if let Some(forward) = &self.forward {
            forward.notify(subject, message).await;
        }
    }
}
