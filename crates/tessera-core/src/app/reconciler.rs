//! Completion reconciler: finalizes deferred-finality tasks when the chain
//! indexer reports on their transaction, then re-drives the lane.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::engine::{EngineError, TaskEngine};
use crate::domain::{TaskId, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Mined,
    Dropped,
}

/// Inbound indexer callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerNotification {
    pub tx_hash: String,
    pub status: ConfirmationStatus,
}

impl IndexerNotification {
    pub fn mined(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            status: ConfirmationStatus::Mined,
        }
    }

    pub fn dropped(tx_hash: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            status: ConfirmationStatus::Dropped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Finalized { task_id: TaskId, state: TaskState },
    /// Duplicate or late notification; the task was already final.
    AlreadyFinal { task_id: TaskId, state: TaskState },
    /// No task carries this transaction hash.
    UnknownTransaction,
}

#[derive(Clone)]
pub struct CompletionReconciler {
    engine: TaskEngine,
}

impl CompletionReconciler {
    pub fn new(engine: TaskEngine) -> Self {
        Self { engine }
    }

    pub async fn on_notification(&self, notification: &IndexerNotification) -> Result<ReconcileOutcome, EngineError> {
        let Some(mut task) = self.engine.store().find_by_tx_hash(&notification.tx_hash).await? else {
            warn!(tx_hash = %notification.tx_hash, "notification for unknown transaction");
            return Ok(ReconcileOutcome::UnknownTransaction);
        };
        if task.state != TaskState::Running {
            info!(task_id = %task.id, state = ?task.state, "notification for settled task ignored");
            return Ok(ReconcileOutcome::AlreadyFinal {
                task_id: task.id,
                state: task.state,
            });
        }

        let mined = notification.status == ConfirmationStatus::Mined;
        task.confirm(mined, self.engine.clock().now());
        if !mined {
            task.last_error = Some(format!("transaction {} was dropped", notification.tx_hash));
            self.engine
                .alerts()
                .notify(
                    "Transaction dropped",
                    &format!("task {} ({}): transaction {} was dropped", task.id, task.kind(), notification.tx_hash),
                )
                .await;
        }
        self.engine.finalize(&mut task, mined).await?;

        self.engine.kick(task.lane());
        Ok(ReconcileOutcome::Finalized {
            task_id: task.id,
            state: task.state,
        })
    }
}
