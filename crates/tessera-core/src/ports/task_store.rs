//! TaskStore port: the durable source of truth for tasks.
//!
//! Lane ownership does not live here; the engine's lane coordinator decides
//! who may run a task. The store only has to answer "what is next on this
//! lane" in FIFO order.

use async_trait::async_trait;

use crate::app::status::TaskCounts;
use crate::domain::{Lane, Task, TaskId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fails with `Duplicate` if the id is taken.
    async fn insert(&self, task: Task) -> Result<(), StoreError>;

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Overwrites an existing task. Fails with `NotFound` if it was never inserted.
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    /// Returns whether anything was removed.
    async fn delete(&self, id: TaskId) -> Result<bool, StoreError>;

    /// Oldest queued task on the lane.
    async fn next_queued(&self, lane: &Lane) -> Result<Option<Task>, StoreError>;

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Task>, StoreError>;

    async fn counts(&self) -> Result<TaskCounts, StoreError>;
}
