//! In-memory TaskStore for development, tests and the CLI demo.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::app::status::TaskCounts;
use crate::domain::{Lane, Task, TaskId, TaskState};
use crate::ports::{StoreError, TaskStore};

/// Tasks keyed by id. ULID order is creation order, so the first queued
/// match while iterating is the lane's FIFO head.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<Mutex<BTreeMap<TaskId, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored task.
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id.to_string()));
        }
        tasks.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().await;
        let slot = tasks
            .get_mut(&task.id)
            .ok_or_else(|| StoreError::NotFound(task.id.to_string()))?;
        *slot = task.clone();
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        Ok(self.tasks.lock().await.remove(&id).is_some())
    }

    async fn next_queued(&self, lane: &Lane) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.lock().await;
        let next = tasks
            .values()
            .filter(|task| task.state == TaskState::Queued)
            .find(|task| task.signer_slot == lane.slot && task.chain == lane.chain)
            .cloned();
        Ok(next)
    }

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .find(|task| task.tx_hash.as_deref() == Some(tx_hash))
            .cloned())
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        Ok(self.tasks.lock().await.values().collect())
    }
}
