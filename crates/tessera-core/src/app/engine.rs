//! Task execution engine.
//!
//! A lane (chain x signer slot) runs one task at a time. Whoever claims the
//! lane drains it in FIFO order until it is empty or a transaction is left
//! waiting for the indexer; the reconciler re-drives the lane after that.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::app::dispatch::{ChainDispatcher, Dispatched};
use crate::app::lanes::LaneCoordinator;
use crate::domain::{Finality, Lane, Task, TaskId, TaskState};
use crate::ports::{AlertSink, Clock, FinalizationHook, StoreError, TaskStore};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task store: {0}")]
    Store(#[from] StoreError),
}

/// What happened to a call of [`TaskEngine::execute_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Another worker holds the lane; it will pick the task up.
    LaneBusy,
    /// The lane was driven until empty or until a task awaited confirmation.
    Drained { processed: usize },
}

/// Result of handling a single task while holding the lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Finalized(TaskState),
    /// Dependencies are not done yet; the task stays queued.
    Skipped,
    /// Submitted; final status comes from the indexer.
    AwaitingConfirmation,
    /// Already running or final; left untouched.
    NotRunnable(TaskState),
}

enum Gate {
    Execute,
    /// Dependencies are unfinished; back off before the lane moves on.
    Skip,
    /// Not released yet; leave it without waiting.
    Hold,
    Cancel(String),
}

pub(crate) struct EngineInner {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) dispatcher: ChainDispatcher,
    pub(crate) lanes: LaneCoordinator,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) hook: Arc<dyn FinalizationHook>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) dependency_wait: Duration,
    pub(crate) indexer_webhooks: bool,
}

/// Cheap to clone; every clone shares the same lanes and stores.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<EngineInner>,
}

impl TaskEngine {
    pub(crate) fn new(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn lanes(&self) -> &LaneCoordinator {
        &self.inner.lanes
    }

    /// Runs `task_id` on `lane`, then keeps pulling queued tasks from the
    /// same lane. Returns `LaneBusy` without touching the task if the lane
    /// is already claimed.
    pub async fn execute_task(&self, task_id: TaskId, lane: &Lane) -> Result<ExecuteOutcome, EngineError> {
        let mut next = Some(task_id);
        let mut processed = 0;
        loop {
            let Some(claim) = self.inner.lanes.try_claim(lane) else {
                debug!(lane = %lane, "lane busy");
                return Ok(if processed == 0 {
                    ExecuteOutcome::LaneBusy
                } else {
                    ExecuteOutcome::Drained { processed }
                });
            };

            let mut awaiting = false;
            while let Some(id) = next.take() {
                let step = self.step(id, lane).await?;
                processed += 1;
                if step == StepOutcome::AwaitingConfirmation {
                    awaiting = true;
                    break;
                }
                next = self.next_queued(lane).await?;
            }
            drop(claim);

            if awaiting {
                return Ok(ExecuteOutcome::Drained { processed });
            }
            // A task queued while the claim was being released found the
            // lane busy and was not started; pick it up here.
            next = self.next_queued(lane).await?;
            if next.is_none() {
                return Ok(ExecuteOutcome::Drained { processed });
            }
        }
    }

    /// Drives the lane from its oldest queued task, if any.
    pub async fn drive_lane(&self, lane: &Lane) -> Result<ExecuteOutcome, EngineError> {
        match self.next_queued(lane).await? {
            Some(id) => self.execute_task(id, lane).await,
            None => Ok(ExecuteOutcome::Drained { processed: 0 }),
        }
    }

    /// Drives the lane in the background.
    pub fn kick(&self, lane: Lane) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(err) = engine.drive_lane(&lane).await {
                error!(lane = %lane, error = %err, "lane worker stopped");
            }
        });
    }

    /// Handles one task. The caller must hold the lane.
    pub(crate) async fn step(&self, task_id: TaskId, lane: &Lane) -> Result<StepOutcome, EngineError> {
        let mut task = self
            .inner
            .store
            .get(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;

        if matches!(task.state, TaskState::Running) || task.state.is_terminal() {
            debug!(task_id = %task.id, state = ?task.state, "task not runnable");
            return Ok(StepOutcome::NotRunnable(task.state));
        }

        match self.gate(&task).await? {
            Gate::Cancel(reason) => {
                warn!(task_id = %task.id, lane = %lane, %reason, "task cancelled");
                self.inner
                    .alerts
                    .notify(
                        "Task cancelled",
                        &format!("task {} ({}) cancelled: {}", task.id, task.kind(), reason),
                    )
                    .await;
                task.cancel(reason, self.inner.clock.now());
                self.complete(&mut task).await?;
                return Ok(StepOutcome::Finalized(TaskState::Failed));
            }
            Gate::Skip => {
                debug!(task_id = %task.id, lane = %lane, "waiting on dependencies");
                tokio::time::sleep(self.inner.dependency_wait).await;
                return Ok(StepOutcome::Skipped);
            }
            Gate::Hold => {
                debug!(task_id = %task.id, lane = %lane, "task not released yet");
                return Ok(StepOutcome::Skipped);
            }
            Gate::Execute => {}
        }

        task.start(self.inner.clock.now());
        self.persist(&task).await?;
        info!(task_id = %task.id, kind = %task.kind(), lane = %lane, "task started");

        match self.inner.dispatcher.dispatch(&mut task).await {
            Ok(Dispatched { receipt, finality }) => {
                task.apply_receipt(receipt);
                let deferred = finality == Finality::Deferred
                    && self.inner.indexer_webhooks
                    && task.tx_hash.is_some();
                if deferred {
                    task.await_confirmation();
                    self.persist(&task).await?;
                    info!(
                        task_id = %task.id,
                        tx_hash = task.tx_hash.as_deref().unwrap_or_default(),
                        "awaiting indexer confirmation"
                    );
                    return Ok(StepOutcome::AwaitingConfirmation);
                }
                self.finalize(&mut task, true).await?;
                Ok(StepOutcome::Finalized(TaskState::Success))
            }
            Err(err) => {
                task.last_error = Some(err.to_string());
                self.finalize(&mut task, false).await?;
                Ok(StepOutcome::Finalized(TaskState::Failed))
            }
        }
    }

    /// Stores the final state and runs the finalization hook.
    pub(crate) async fn finalize(&self, task: &mut Task, success: bool) -> Result<(), EngineError> {
        task.finish(success, self.inner.clock.now());
        self.complete(task).await
    }

    async fn complete(&self, task: &mut Task) -> Result<(), EngineError> {
        self.persist(task).await?;
        self.inner.hook.on_finalized(task).await;
        info!(
            task_id = %task.id,
            kind = %task.kind(),
            state = ?task.state,
            tries = task.tries,
            "task finished"
        );
        Ok(())
    }

    /// Saves `task`, backing off and retrying while the store backend is
    /// failing. A task left `Running` in the store would never be driven
    /// again, so only a missing or duplicate record gives up.
    async fn persist(&self, task: &Task) -> Result<(), EngineError> {
        let dispatcher = &self.inner.dispatcher;
        let mut failures = 0;
        loop {
            let err = match self.inner.store.save(task).await {
                Ok(()) => return Ok(()),
                Err(err @ (StoreError::NotFound(_) | StoreError::Duplicate(_))) => return Err(err.into()),
                Err(err) => err,
            };
            failures += 1;
            let delay = dispatcher.retry.next_delay(failures);
            warn!(
                task_id = %task.id,
                state = ?task.state,
                failures,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "could not save task, retrying"
            );
            if failures == dispatcher.alert_after_failures {
                self.inner
                    .alerts
                    .notify(
                        "Task store unavailable",
                        &format!("task {} ({}) could not be saved {} times: {}", task.id, task.kind(), failures, err),
                    )
                    .await;
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Missing or failed dependencies cancel; unfinished ones skip. A task
    /// still idle (not yet released) is held without the dependency wait.
    async fn gate(&self, task: &Task) -> Result<Gate, EngineError> {
        let mut gate = Gate::Execute;
        for dependency in &task.required_tasks {
            match self.inner.store.get(*dependency).await? {
                None => {
                    return Ok(Gate::Cancel(format!("required task {dependency} does not exist")));
                }
                Some(required) if required.state == TaskState::Failed => {
                    return Ok(Gate::Cancel(format!("required task {dependency} failed")));
                }
                Some(required) if required.state != TaskState::Success => gate = Gate::Skip,
                Some(_) => {}
            }
        }
        if task.state == TaskState::Idle {
            gate = Gate::Hold;
        }
        Ok(gate)
    }

    async fn next_queued(&self, lane: &Lane) -> Result<Option<TaskId>, EngineError> {
        Ok(self.inner.store.next_queued(lane).await?.map(|task| task.id))
    }

    pub(crate) fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    pub(crate) fn alerts(&self) -> &Arc<dyn AlertSink> {
        &self.inner.alerts
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::EngineConfig;
    use crate::app::testkit::{Harness, ScriptedAdapter, fast_config};
    use crate::domain::{NewTask, SignerSlot, WebhookState};
    use chrono::Utc;

    /// Stores a queued task on `slot` without kicking its lane.
    async fn queued(h: &Harness, new: NewTask, slot: u32) -> Task {
        let mut task = Task::new(TaskId::generate(), new, SignerSlot::new(slot), Utc::now());
        task.queue();
        h.store.insert(task.clone()).await.unwrap();
        task
    }

    #[tokio::test]
    async fn claimed_lane_reports_busy() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let task = queued(&h, h.transfer("near", wallet.id, "1"), 1).await;

        let claim = h.app.engine.lanes().try_claim(&task.lane()).unwrap();
        let outcome = h.app.engine.execute_task(task.id, &task.lane()).await.unwrap();
        assert_eq!(outcome, ExecuteOutcome::LaneBusy);
        assert_eq!(h.task(task.id).await.state, TaskState::Queued);
        drop(claim);

        let outcome = h.app.engine.execute_task(task.id, &task.lane()).await.unwrap();
        assert_eq!(outcome, ExecuteOutcome::Drained { processed: 1 });
        assert_eq!(h.task(task.id).await.state, TaskState::Success);
    }

    #[tokio::test]
    async fn missing_dependency_cancels_without_chain_call() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let missing = TaskId::generate();
        let task = queued(&h, h.transfer("near", wallet.id, "1").requires([missing]), 1).await;

        h.app.engine.execute_task(task.id, &task.lane()).await.unwrap();

        let task = h.task(task.id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.last_error.unwrap().contains("does not exist"));
        assert_eq!(task.tries, 0);
        assert_eq!(h.near.calls(), 0);
        assert_eq!(h.alerts.alerts()[0].subject, "Task cancelled");
        assert_eq!(h.hook.calls(), vec![(task.id, TaskState::Failed)]);
    }

    #[tokio::test]
    async fn failed_dependency_cancels() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let mut failed = queued(&h, h.transfer("near", wallet.id, "1"), 1).await;
        failed.finish(false, Utc::now());
        h.store.save(&failed).await.unwrap();

        let task = queued(&h, h.transfer("near", wallet.id, "2").requires([failed.id]), 2).await;
        h.app.engine.execute_task(task.id, &task.lane()).await.unwrap();

        let task = h.task(task.id).await;
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.last_error.unwrap().contains("failed"));
        assert_eq!(h.near.calls(), 0);
    }

    #[tokio::test]
    async fn pending_dependency_skips_until_it_succeeds() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let dependency = queued(&h, h.transfer("near", wallet.id, "1"), 1).await;
        let task = queued(&h, h.transfer("near", wallet.id, "2").requires([dependency.id]), 2).await;

        let engine = h.app.engine.clone();
        let (id, lane) = (task.id, task.lane());
        let waiting = tokio::spawn(async move { engine.execute_task(id, &lane).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        let skipped = h.task(task.id).await;
        assert_eq!(skipped.state, TaskState::Queued);
        assert_eq!(skipped.tries, 0);
        assert_eq!(h.near.calls(), 0);

        h.app.engine.execute_task(dependency.id, &dependency.lane()).await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Drained { .. }));

        let done = h.task(task.id).await;
        assert_eq!(done.state, TaskState::Success);
        assert_eq!(done.tries, 0);
    }

    #[tokio::test]
    async fn idle_task_is_not_run() {
        let config = EngineConfig {
            dependency_wait_ms: 60_000,
            ..fast_config()
        };
        let h = Harness::new(config, ScriptedAdapter::evm(), ScriptedAdapter::near());
        let wallet = h.wallet("near", false).await;
        let task = h
            .app
            .submitter
            .create_task(h.transfer("near", wallet.id, "1"), None)
            .await
            .unwrap();

        // An idle task must not hold the lane for the dependency wait.
        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            h.app.engine.execute_task(task.id, &task.lane()),
        )
        .await
        .expect("idle task held the lane")
        .unwrap();
        assert_eq!(outcome, ExecuteOutcome::Drained { processed: 1 });
        assert_eq!(h.task(task.id).await.state, TaskState::Idle);
        assert_eq!(h.near.calls(), 0);
    }

    #[tokio::test]
    async fn finished_task_is_not_runnable() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let id = h.app.submitter.add_task(h.transfer("near", wallet.id, "1"), None).await.unwrap();
        let task = h.wait_for(id, TaskState::Success).await;

        // the background worker may still be releasing the lane
        let claim = loop {
            if let Some(claim) = h.app.engine.lanes().try_claim(&task.lane()) {
                break claim;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        };
        let step = h.app.engine.step(id, &task.lane()).await.unwrap();
        assert_eq!(step, StepOutcome::NotRunnable(TaskState::Success));
        assert_eq!(h.near.calls(), 1);
        drop(claim);
    }

    #[tokio::test]
    async fn synchronous_chain_finalizes_immediately() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let id = h.app.submitter.add_task(h.transfer("near", wallet.id, "1"), None).await.unwrap();

        let task = h.wait_for(id, TaskState::Success).await;
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.webhook, WebhookState::Idle);
        assert_eq!(task.tx_hash.as_deref(), Some("0x0001"));
        assert_eq!(task.cost, Some(21_000));
        assert!(task.started_at.is_some() && task.ended_at.is_some());
        assert_eq!(h.hook.calls(), vec![(id, TaskState::Success)]);
    }

    #[tokio::test]
    async fn refused_final_save_is_retried_and_alerted() {
        let h = Harness::default_adapters();
        h.journal.fail_saves(3, |task| task.state == TaskState::Success);
        let wallet = h.wallet("near", false).await;
        let id = h.app.submitter.add_task(h.transfer("near", wallet.id, "1"), None).await.unwrap();

        let task = h.wait_for(id, TaskState::Success).await;
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(h.near.calls(), 1);
        assert_eq!(h.hook.calls(), vec![(id, TaskState::Success)]);
        let subjects: Vec<String> = h.alerts.alerts().into_iter().map(|a| a.subject).collect();
        assert_eq!(subjects, vec!["Task store unavailable".to_string()]);
    }

    #[tokio::test]
    async fn refused_start_save_does_not_strand_the_lane() {
        let h = Harness::default_adapters();
        h.journal.fail_saves(1, |task| task.state == TaskState::Running);
        let wallet = h.wallet("near", false).await;
        let first = queued(&h, h.transfer("near", wallet.id, "1"), 1).await;
        let second = queued(&h, h.transfer("near", wallet.id, "2"), 1).await;

        let outcome = h.app.engine.execute_task(first.id, &first.lane()).await.unwrap();
        assert_eq!(outcome, ExecuteOutcome::Drained { processed: 2 });
        assert_eq!(h.task(first.id).await.state, TaskState::Success);
        assert_eq!(h.task(second.id).await.state, TaskState::Success);
        assert!(h.alerts.alerts().is_empty());
    }

    #[tokio::test]
    async fn deferred_chain_finalizes_without_indexer_webhooks() {
        let config = EngineConfig {
            indexer_webhooks: false,
            ..fast_config()
        };
        let h = Harness::new(config, ScriptedAdapter::evm(), ScriptedAdapter::near());
        let wallet = h.wallet("polygon", false).await;
        let id = h.app.submitter.add_task(h.transfer("polygon", wallet.id, "1"), None).await.unwrap();

        let task = h.wait_for(id, TaskState::Success).await;
        assert_eq!(task.state, TaskState::Success);
        assert_eq!(task.webhook, WebhookState::Idle);
    }

    #[tokio::test]
    async fn lane_drains_in_fifo_order() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("near", false).await;
        let mut ids = Vec::new();
        for amount in ["1", "2", "3"] {
            let task = h
                .app
                .submitter
                .create_task(h.transfer("near", wallet.id, amount), Some(SignerSlot::new(1)))
                .await
                .unwrap();
            let mut task = h.task(task.id).await;
            task.queue();
            h.store.save(&task).await.unwrap();
            ids.push(task.id);
        }

        let lane = h.task(ids[0]).await.lane();
        let outcome = h.app.engine.execute_task(ids[0], &lane).await.unwrap();
        assert_eq!(outcome, ExecuteOutcome::Drained { processed: 3 });

        let finished: Vec<TaskId> = h.hook.calls().into_iter().map(|(id, _)| id).collect();
        assert_eq!(finished, ids);
        assert!(!h.app.engine.lanes().is_busy(&lane));
    }

    #[tokio::test]
    async fn second_caller_on_running_lane_is_busy() {
        let h = Harness::new(
            fast_config(),
            ScriptedAdapter::evm(),
            ScriptedAdapter::near().with_delay(Duration::from_millis(40)),
        );
        let wallet = h.wallet("near", false).await;
        let first = queued(&h, h.transfer("near", wallet.id, "1"), 1).await;
        let second = queued(&h, h.transfer("near", wallet.id, "2"), 1).await;

        let engine = h.app.engine.clone();
        let (id, lane) = (first.id, first.lane());
        let running = tokio::spawn(async move { engine.execute_task(id, &lane).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let outcome = h.app.engine.execute_task(second.id, &second.lane()).await.unwrap();
        assert_eq!(outcome, ExecuteOutcome::LaneBusy);

        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome, ExecuteOutcome::Drained { processed: 2 });
        assert_eq!(h.task(second.id).await.state, TaskState::Success);
    }

    #[tokio::test]
    async fn separate_slots_run_independently() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("polygon", true).await;
        let a = h
            .app
            .submitter
            .add_task(h.transfer("polygon", wallet.id, "1"), Some(SignerSlot::new(1)))
            .await
            .unwrap();
        let b = h
            .app
            .submitter
            .add_task(h.transfer("polygon", wallet.id, "2"), Some(SignerSlot::new(2)))
            .await
            .unwrap();

        // Each lane holds one unconfirmed transaction at the same time.
        assert!(h.wait_for_confirmation(a).await.is_awaiting_confirmation());
        assert!(h.wait_for_confirmation(b).await.is_awaiting_confirmation());
    }
}
