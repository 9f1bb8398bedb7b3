//! Task record and its state machine.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ContractId, NftId, ProjectId, TaskId, WalletId};
use super::lane::{Chain, Lane, SignerSlot};
use super::outcome::{DispatchReceipt, SignedTransaction};
use super::payload::{TaskKind, TaskPayload};

/// Task state.
///
/// Transitions:
/// - Idle -> Queued -> Running -> Success | Failed
/// - Running stays Running while a deferred transaction awaits the indexer
/// - a cancelled task is stored as Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created but not yet released for execution (signing may be pending).
    Idle,
    Queued,
    Running,
    Success,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed)
    }
}

/// Progress of the out-of-band confirmation for deferred-finality tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookState {
    #[default]
    Idle,
    Pending,
    Success,
    Failed,
}

/// Caller input for a new task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub project_id: ProjectId,
    pub chain: Chain,
    pub payload: TaskPayload,
    pub wallet1: Option<WalletId>,
    pub wallet2: Option<WalletId>,
    pub contract_id: Option<ContractId>,
    pub nft_id: Option<NftId>,
    pub required_tasks: Vec<TaskId>,
}

impl NewTask {
    pub fn new(project_id: ProjectId, chain: Chain, payload: TaskPayload) -> Self {
        Self {
            project_id,
            chain,
            payload,
            wallet1: None,
            wallet2: None,
            contract_id: None,
            nft_id: None,
            required_tasks: Vec::new(),
        }
    }

    /// Source wallet (the signer).
    pub fn from_wallet(mut self, wallet: WalletId) -> Self {
        self.wallet1 = Some(wallet);
        self
    }

    /// Destination wallet.
    pub fn to_wallet(mut self, wallet: WalletId) -> Self {
        self.wallet2 = Some(wallet);
        self
    }

    pub fn on_contract(mut self, contract: ContractId) -> Self {
        self.contract_id = Some(contract);
        self
    }

    pub fn for_nft(mut self, nft: NftId) -> Self {
        self.nft_id = Some(nft);
        self
    }

    pub fn requires(mut self, tasks: impl IntoIterator<Item = TaskId>) -> Self {
        self.required_tasks.extend(tasks);
        self
    }
}

/// The persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub chain: Chain,
    pub payload: TaskPayload,
    pub state: TaskState,
    pub signer_slot: SignerSlot,

    pub wallet1: Option<WalletId>,
    pub wallet2: Option<WalletId>,
    pub contract_id: Option<ContractId>,
    pub nft_id: Option<NftId>,

    /// Tasks that must succeed before this one may run.
    pub required_tasks: Vec<TaskId>,

    pub nonce: Option<u64>,
    pub signed: Option<SignedTransaction>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Failed attempts so far. Never touched by dependency skips.
    pub tries: u32,
    pub try_again_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,

    pub tx_hash: Option<String>,
    pub cost: Option<u128>,
    pub output: Option<Value>,

    pub webhook: WebhookState,
    pub webhook_error_counter: u32,
    pub webhook_last_call_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, new: NewTask, signer_slot: SignerSlot, now: DateTime<Utc>) -> Self {
        Self {
            id,
            project_id: new.project_id,
            chain: new.chain,
            payload: new.payload,
            state: TaskState::Idle,
            signer_slot,
            wallet1: new.wallet1,
            wallet2: new.wallet2,
            contract_id: new.contract_id,
            nft_id: new.nft_id,
            required_tasks: new.required_tasks,
            nonce: None,
            signed: None,
            created_at: now,
            started_at: None,
            ended_at: None,
            tries: 0,
            try_again_at: None,
            last_error: None,
            tx_hash: None,
            cost: None,
            output: None,
            webhook: WebhookState::Idle,
            webhook_error_counter: 0,
            webhook_last_call_at: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    pub fn lane(&self) -> Lane {
        Lane::new(self.chain.clone(), self.signer_slot)
    }

    /// Release the task for execution.
    pub fn queue(&mut self) {
        self.state = TaskState::Queued;
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Running;
        self.started_at = Some(now);
    }

    /// Book a failed attempt that will be retried after `delay`.
    pub fn record_retry(&mut self, now: DateTime<Utc>, delay: Duration, error: String) {
        self.tries += 1;
        self.try_again_at = TimeDelta::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .or(Some(now));
        self.last_error = Some(error);
    }

    pub fn apply_receipt(&mut self, receipt: DispatchReceipt) {
        if receipt.tx_hash.is_some() {
            self.tx_hash = receipt.tx_hash;
        }
        if receipt.cost.is_some() {
            self.cost = receipt.cost;
        }
        if receipt.output.is_some() {
            self.output = receipt.output;
        }
    }

    /// Keep running until the indexer reports on `tx_hash`.
    pub fn await_confirmation(&mut self) {
        self.webhook = WebhookState::Pending;
    }

    /// Record the indexer's verdict on the submitted transaction.
    pub fn confirm(&mut self, mined: bool, now: DateTime<Utc>) {
        self.webhook = if mined {
            WebhookState::Success
        } else {
            self.webhook_error_counter += 1;
            WebhookState::Failed
        };
        self.webhook_last_call_at = Some(now);
    }

    pub fn finish(&mut self, success: bool, now: DateTime<Utc>) {
        self.state = if success {
            TaskState::Success
        } else {
            TaskState::Failed
        };
        self.ended_at = Some(now);
    }

    /// A cancelled task is stored as failed with the reason attached.
    pub fn cancel(&mut self, reason: String, now: DateTime<Utc>) {
        self.last_error = Some(reason);
        self.finish(false, now);
    }

    pub fn is_awaiting_confirmation(&self) -> bool {
        self.state == TaskState::Running && self.webhook == WebhookState::Pending
    }
}
