//! Status views.

use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskState};

/// Task totals by state. `awaiting_confirmation` is the subset of `running`
/// whose transaction is waiting on the indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub idle: usize,
    pub queued: usize,
    pub running: usize,
    pub awaiting_confirmation: usize,
    pub success: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn record(&mut self, task: &Task) {
        match task.state {
            TaskState::Idle => self.idle += 1,
            TaskState::Queued => self.queued += 1,
            TaskState::Running => {
                self.running += 1;
                if task.is_awaiting_confirmation() {
                    self.awaiting_confirmation += 1;
                }
            }
            TaskState::Success => self.success += 1,
            TaskState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.idle + self.queued + self.running + self.success + self.failed
    }

    /// Nothing left to do: every task is final.
    pub fn is_settled(&self) -> bool {
        self.idle == 0 && self.queued == 0 && self.running == 0
    }
}

impl<'a> FromIterator<&'a Task> for TaskCounts {
    fn from_iter<I: IntoIterator<Item = &'a Task>>(iter: I) -> Self {
        let mut counts = TaskCounts::default();
        for task in iter {
            counts.record(task);
        }
        counts
    }
}
