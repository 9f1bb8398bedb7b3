//! FinalizationHook implementations.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::{Task, TaskId, TaskState};
use crate::ports::FinalizationHook;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFinalizationHook;

#[async_trait]
impl FinalizationHook for NoopFinalizationHook {
    async fn on_finalized(&self, _task: &Task) {}
}

/// Records `(task, final state)` in call order.
#[derive(Debug, Clone, Default)]
pub struct RecordingFinalizationHook {
    calls: Arc<Mutex<Vec<(TaskId, TaskState)>>>,
}

impl RecordingFinalizationHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(TaskId, TaskState)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl FinalizationHook for RecordingFinalizationHook {
    async fn on_finalized(&self, task: &Task) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((task.id, task.state));
    }
}
