//! Task submission: create, capture a nonce under the wallet lock, sign,
//! then release the task to its lane.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{info, warn};

use crate::app::adapters::AdapterRegistry;
use crate::app::engine::TaskEngine;
use crate::app::wallet_lock::WalletLocks;
use crate::custody::{CustodyError, KeyCustodian, Share};
use crate::domain::{NewTask, SignerSlot, Task, TaskId, TaskState};
use crate::ports::{Clock, IdGenerator, StoreError, TaskStore, WalletStore};

/// Caller-facing submission errors. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("wallet {0} has no key share")]
    MissingKeyShare(String),

    #[error("wallet is on {wallet} but the task targets {task}")]
    ChainMismatch { wallet: String, task: String },

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("required task {0} does not exist")]
    UnknownDependency(TaskId),

    #[error("no adapter for chain {0}")]
    UnsupportedChain(String),

    #[error("task {0} is not idle")]
    NotIdle(TaskId),

    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SubmitError {
    /// Stable numeric code for API responses.
    pub fn code(&self) -> u32 {
        match self {
            SubmitError::InvalidWallet(_) => 5510,
            SubmitError::MissingKeyShare(_) => 5511,
            SubmitError::ChainMismatch { .. } => 5512,
            SubmitError::SigningFailed(_) | SubmitError::Custody(_) => 5513,
            SubmitError::UnknownDependency(_) => 5514,
            SubmitError::UnsupportedChain(_) => 5515,
            SubmitError::NotIdle(_) => 5516,
            SubmitError::Store(_) => 5500,
        }
    }
}

/// Round-robin over signer slots `1..=slots`.
#[derive(Debug)]
pub struct SlotSelector {
    slots: u32,
    cursor: AtomicU32,
}

impl SlotSelector {
    pub fn new(slots: u32) -> Self {
        Self {
            slots: slots.max(1),
            cursor: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> SignerSlot {
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        SignerSlot::new(n % self.slots + 1)
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }
}

pub struct TaskSubmitter {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) wallets: Arc<dyn WalletStore>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) locks: WalletLocks,
    pub(crate) custodian: KeyCustodian,
    pub(crate) slots: SlotSelector,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) engine: TaskEngine,
}

impl TaskSubmitter {
    pub fn locks(&self) -> &WalletLocks {
        &self.locks
    }

    /// Stores a new idle task on `slot`, or on the next slot in rotation.
    pub async fn create_task(&self, new: NewTask, slot: Option<SignerSlot>) -> Result<Task, SubmitError> {
        for dependency in &new.required_tasks {
            if self.store.get(*dependency).await?.is_none() {
                return Err(SubmitError::UnknownDependency(*dependency));
            }
        }
        let slot = slot.unwrap_or_else(|| self.slots.next());
        let task = Task::new(self.ids.generate_task_id(), new, slot, self.clock.now());
        self.store.insert(task.clone()).await?;
        Ok(task)
    }

    /// Releases an idle task to its lane.
    pub async fn queue_task(&self, id: TaskId) -> Result<(), SubmitError> {
        let mut task = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if task.state != TaskState::Idle {
            return Err(SubmitError::NotIdle(id));
        }
        task.queue();
        self.store.save(&task).await?;
        info!(task_id = %task.id, kind = %task.kind(), lane = %task.lane(), "task queued");
        self.engine.kick(task.lane());
        Ok(())
    }

    /// Creates and queues a task that needs no pre-signing.
    pub async fn add_task(&self, new: NewTask, slot: Option<SignerSlot>) -> Result<TaskId, SubmitError> {
        let task = self.create_task(new, slot).await?;
        self.queue_task(task.id).await?;
        Ok(task.id)
    }

    /// Creates a task, captures the next nonce of the source wallet under
    /// the wallet lock, signs with the wallet's share plus the caller's,
    /// and queues it. On a signing failure the idle task is deleted.
    pub async fn submit_signed(
        &self,
        new: NewTask,
        caller_share: &Share,
        slot: Option<SignerSlot>,
    ) -> Result<TaskId, SubmitError> {
        let wallet_id = new
            .wallet1
            .ok_or_else(|| SubmitError::InvalidWallet("no source wallet given".into()))?;
        let wallet = self
            .wallets
            .get(wallet_id)
            .await?
            .ok_or_else(|| SubmitError::InvalidWallet(wallet_id.to_string()))?;
        if wallet.chain != new.chain {
            return Err(SubmitError::ChainMismatch {
                wallet: wallet.chain.to_string(),
                task: new.chain.to_string(),
            });
        }
        let wallet_share = wallet
            .key_share
            .clone()
            .ok_or_else(|| SubmitError::MissingKeyShare(wallet_id.to_string()))?;
        let adapter = self
            .adapters
            .for_chain(&new.chain)
            .ok_or_else(|| SubmitError::UnsupportedChain(new.chain.to_string()))?;

        let slot = slot.unwrap_or_else(|| self.slots.next());
        let counter = wallet.counter_slot(slot);

        let guard = self.locks.lock(wallet_id, counter).await;
        let mut task = self.create_task(new, Some(slot)).await?;
        let nonce = match self.capture_nonce(&mut task, counter).await {
            Ok(nonce) => nonce,
            Err(err) => {
                self.discard(task.id).await;
                return Err(err);
            }
        };
        guard.unlock();

        let signed = self
            .custodian
            .with_secret(&[wallet_share, caller_share.clone()], |secret| {
                adapter.sign(secret, &task, nonce)
            });
        let signed = match signed {
            Ok(Ok(signed)) => signed,
            Ok(Err(err)) => {
                self.discard(task.id).await;
                return Err(SubmitError::SigningFailed(err.to_string()));
            }
            Err(err) => {
                self.discard(task.id).await;
                return Err(err.into());
            }
        };

        task.signed = Some(signed);
        self.store.save(&task).await?;
        self.queue_task(task.id).await?;
        info!(task_id = %task.id, wallet = %wallet_id, nonce, "signed task submitted");
        Ok(task.id)
    }

    async fn capture_nonce(&self, task: &mut Task, counter: SignerSlot) -> Result<u64, SubmitError> {
        let wallet_id = task
            .wallet1
            .ok_or_else(|| SubmitError::InvalidWallet("no source wallet given".into()))?;
        let nonce = self.wallets.nonce(wallet_id, counter).await?;
        self.wallets.set_nonce(wallet_id, counter, nonce + 1).await?;
        task.nonce = Some(nonce);
        self.store.save(task).await?;
        Ok(nonce)
    }

    async fn discard(&self, id: TaskId) {
        match self.store.delete(id).await {
            Ok(_) => warn!(task_id = %id, "idle task discarded after failed submission"),
            Err(err) => warn!(task_id = %id, error = %err, "could not discard idle task"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testkit::{Harness, ScriptedAdapter, WALLET_KEY, fast_config};
    use crate::custody::{KeyCustodian, ShareScheme};
    use crate::domain::{Chain, TaskPayload};
    use crate::ports::WalletStore;
    use rstest::rstest;
    use std::collections::HashSet;

    /// Wallet with a provisioned key; returns the tenant's share.
    async fn signing_wallet(h: &Harness, chain: &str, multi_nonce: bool) -> (crate::domain::Wallet, Share) {
        let bundle = KeyCustodian::new(ShareScheme::default())
            .unwrap()
            .provision(WALLET_KEY)
            .unwrap();
        let wallet = h.wallet(chain, multi_nonce).await.with_key_share(bundle.wallet.clone());
        h.wallets.save(&wallet).await.unwrap();
        (wallet, bundle.tenant[0].clone())
    }

    fn signing_harness() -> Harness {
        Harness::new(
            fast_config(),
            ScriptedAdapter::evm().expecting_secret(WALLET_KEY),
            ScriptedAdapter::near(),
        )
    }

    #[test]
    fn slot_selector_rotates() {
        let selector = SlotSelector::new(3);
        let slots: Vec<u32> = (0..7).map(|_| selector.next().get()).collect();
        assert_eq!(slots, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[rstest]
    #[case::invalid_wallet(SubmitError::InvalidWallet("w".into()), 5510)]
    #[case::missing_share(SubmitError::MissingKeyShare("w".into()), 5511)]
    #[case::chain_mismatch(SubmitError::ChainMismatch { wallet: "a".into(), task: "b".into() }, 5512)]
    #[case::signing(SubmitError::SigningFailed("x".into()), 5513)]
    #[case::dependency(SubmitError::UnknownDependency(TaskId::generate()), 5514)]
    fn error_codes(#[case] err: SubmitError, #[case] code: u32) {
        assert_eq!(err.code(), code);
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected_up_front() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("polygon", false).await;
        let missing = TaskId::generate();

        let err = h
            .app
            .submitter
            .create_task(h.transfer("polygon", wallet.id, "1").requires([missing]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::UnknownDependency(id) if id == missing));
    }

    #[tokio::test]
    async fn signed_submission_captures_nonce_and_signature() {
        let h = signing_harness();
        let (wallet, tenant_share) = signing_wallet(&h, "polygon", false).await;

        let id = h
            .app
            .submitter
            .submit_signed(h.transfer("polygon", wallet.id, "3"), &tenant_share, None)
            .await
            .unwrap();

        let task = h.task(id).await;
        assert_eq!(task.nonce, Some(0));
        assert_eq!(task.signed.as_ref().unwrap().signatures, vec!["sig-0"]);
        assert_eq!(h.wallets.nonce(wallet.id, SignerSlot::SHARED).await.unwrap(), 1);
        assert_eq!(h.app.submitter.locks().active(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_get_unique_sequential_nonces() {
        let h = signing_harness();
        let (wallet, tenant_share) = signing_wallet(&h, "polygon", false).await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let submitter = Arc::clone(&h.app.submitter);
            let new = h.transfer("polygon", wallet.id, &i.to_string());
            let share = tenant_share.clone();
            handles.push(tokio::spawn(async move { submitter.submit_signed(new, &share, None).await }));
        }

        let mut nonces = Vec::new();
        for handle in handles {
            let id = handle.await.unwrap().unwrap();
            nonces.push(h.task(id).await.nonce.unwrap());
        }
        let unique: HashSet<u64> = nonces.iter().copied().collect();
        assert_eq!(unique.len(), 12);
        nonces.sort_unstable();
        assert_eq!(nonces, (0..12).collect::<Vec<u64>>());
        assert_eq!(h.wallets.nonce(wallet.id, SignerSlot::SHARED).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn signed_transfers_on_two_slots_both_complete() {
        let h = Harness::new(
            fast_config(),
            ScriptedAdapter::evm(),
            ScriptedAdapter::near().expecting_secret(WALLET_KEY),
        );
        let (wallet, tenant_share) = signing_wallet(&h, "near", false).await;
        let submitter = &h.app.submitter;

        let a = submitter
            .submit_signed(h.transfer("near", wallet.id, "1"), &tenant_share, Some(SignerSlot::new(1)))
            .await
            .unwrap();
        let b = submitter
            .submit_signed(h.transfer("near", wallet.id, "2"), &tenant_share, Some(SignerSlot::new(2)))
            .await
            .unwrap();

        let a = h.wait_for(a, TaskState::Success).await;
        let b = h.wait_for(b, TaskState::Success).await;
        assert_eq!(a.state, TaskState::Success);
        assert_eq!(b.state, TaskState::Success);
        assert_ne!(a.lane(), b.lane());

        let nonces: HashSet<u64> = [a.nonce.unwrap(), b.nonce.unwrap()].into_iter().collect();
        assert_eq!(nonces, HashSet::from([0, 1]));
        assert!(a.signed.is_some() && b.signed.is_some());
        assert_eq!(h.wallets.nonce(wallet.id, SignerSlot::SHARED).await.unwrap(), 2);
        assert_eq!(h.near.calls(), 2);
    }

    #[tokio::test]
    async fn multi_nonce_wallet_counts_per_slot() {
        let h = signing_harness();
        let (wallet, tenant_share) = signing_wallet(&h, "polygon", true).await;
        let submitter = &h.app.submitter;

        let a = submitter
            .submit_signed(h.transfer("polygon", wallet.id, "1"), &tenant_share, Some(SignerSlot::new(1)))
            .await
            .unwrap();
        let b = submitter
            .submit_signed(h.transfer("polygon", wallet.id, "1"), &tenant_share, Some(SignerSlot::new(2)))
            .await
            .unwrap();
        let c = submitter
            .submit_signed(h.transfer("polygon", wallet.id, "1"), &tenant_share, Some(SignerSlot::new(1)))
            .await
            .unwrap();

        assert_eq!(h.task(a).await.nonce, Some(0));
        assert_eq!(h.task(b).await.nonce, Some(0));
        assert_eq!(h.task(c).await.nonce, Some(1));
    }

    #[tokio::test]
    async fn wrong_share_deletes_idle_task() {
        let h = signing_harness();
        let (wallet, _) = signing_wallet(&h, "polygon", false).await;
        // share of an unrelated key: reconstructs garbage, adapter refuses to sign
        let foreign = KeyCustodian::default().provision(b"another-key-entirely-000000000000000").unwrap();

        let err = h
            .app
            .submitter
            .submit_signed(h.transfer("polygon", wallet.id, "1"), &foreign.tenant[0], None)
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::SigningFailed(_) | SubmitError::Custody(_)));
        assert_eq!(err.code(), 5513);
        let counts = h.store.counts().await.unwrap();
        assert_eq!(counts.total(), 0);
    }

    #[tokio::test]
    async fn wallet_without_share_is_rejected() {
        let h = signing_harness();
        let wallet = h.wallet("polygon", false).await;
        let (_, share) = signing_wallet(&h, "polygon", false).await;

        let err = h
            .app
            .submitter
            .submit_signed(h.transfer("polygon", wallet.id, "1"), &share, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), 5511);
    }

    #[tokio::test]
    async fn chain_mismatch_is_rejected() {
        let h = signing_harness();
        let (wallet, share) = signing_wallet(&h, "polygon", false).await;
        let new = NewTask::new(
            h.project,
            Chain::new("mumbai"),
            TaskPayload::Transfer(crate::domain::TransferParams { amount: "1".into() }),
        )
        .from_wallet(wallet.id);

        let err = h.app.submitter.submit_signed(new, &share, None).await.unwrap_err();
        assert_eq!(err.code(), 5512);
    }

    #[tokio::test]
    async fn queueing_twice_is_rejected() {
        let h = Harness::default_adapters();
        let wallet = h.wallet("polygon", false).await;
        let id = h.app.submitter.add_task(h.transfer("polygon", wallet.id, "1"), None).await.unwrap();

        let err = h.app.submitter.queue_task(id).await.unwrap_err();
        assert!(matches!(err, SubmitError::NotIdle(_)));
    }
}
