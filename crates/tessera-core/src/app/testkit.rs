//! Shared fixtures for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use zeroize::Zeroizing;

use crate::app::builder::{EngineBuilder, Tessera};
use crate::app::config::{EngineConfig, RetryConfig};
use crate::app::status::TaskCounts;
use crate::domain::{
    Chain, ChainError, ChainFamily, DispatchReceipt, Lane, NewTask, ProjectId, SignedTransaction,
    Task, TaskId, TaskPayload, TaskState, TransferParams, Wallet, WalletId,
};
use crate::impls::{
    InMemoryShareEscrow, InMemoryTaskStore, InMemoryWalletStore, LocalObjectStore,
    RecordingAlertSink, RecordingFinalizationHook,
};
use crate::ports::{ChainAdapter, ReserveStatus, StoreError, TaskStore, WalletDeployment};

pub const WALLET_KEY: &[u8] = b"ed25519:test-wallet-secret-key-material";

/// Chain adapter whose answers are queued up by the test.
pub struct ScriptedAdapter {
    family: ChainFamily,
    synchronous: bool,
    script: Mutex<VecDeque<Result<DispatchReceipt, ChainError>>>,
    reserve: Mutex<VecDeque<ReserveStatus>>,
    expected_secret: Option<Vec<u8>>,
    calls: AtomicU32,
    replenish_calls: AtomicU32,
    hashes: AtomicU64,
    delay: Duration,
}

impl ScriptedAdapter {
    pub fn evm() -> Self {
        Self::new(ChainFamily::Evm, false)
    }

    pub fn near() -> Self {
        Self::new(ChainFamily::Near, true)
    }

    fn new(family: ChainFamily, synchronous: bool) -> Self {
        Self {
            family,
            synchronous,
            script: Mutex::new(VecDeque::new()),
            reserve: Mutex::new(VecDeque::new()),
            expected_secret: None,
            calls: AtomicU32::new(0),
            replenish_calls: AtomicU32::new(0),
            hashes: AtomicU64::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Queue the results of the next calls; once drained, calls succeed.
    pub fn with_script(self, results: impl IntoIterator<Item = Result<DispatchReceipt, ChainError>>) -> Self {
        self.script.lock().unwrap().extend(results);
        self
    }

    pub fn with_reserve(self, statuses: impl IntoIterator<Item = ReserveStatus>) -> Self {
        self.reserve.lock().unwrap().extend(statuses);
        self
    }

    /// Signing fails unless the reassembled key equals `secret`.
    pub fn expecting_secret(mut self, secret: &[u8]) -> Self {
        self.expected_secret = Some(secret.to_vec());
        self
    }

    /// Every chain call takes this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn replenish_calls(&self) -> u32 {
        self.replenish_calls.load(Ordering::SeqCst)
    }

    async fn next_result(&self) -> Result<DispatchReceipt, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            let n = self.hashes.fetch_add(1, Ordering::SeqCst);
            Ok(DispatchReceipt::new()
                .with_tx_hash(format!("0x{:04x}", n + 1))
                .with_cost(21_000))
        })
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn family(&self) -> ChainFamily {
        self.family
    }

    fn confirms_synchronously(&self) -> bool {
        self.synchronous
    }

    async fn deploy_wallet(&self, task: &Task) -> Result<WalletDeployment, ChainError> {
        let receipt = self.next_result().await?;
        Ok(WalletDeployment {
            address: format!("{}.tessera.testnet", task.id.as_ulid()).to_lowercase(),
            account_id: Some(format!("acct-{}", task.id.as_ulid())),
            secret: Some(Zeroizing::new(WALLET_KEY.to_vec())),
            tx_hash: receipt.tx_hash,
            cost: receipt.cost,
        })
    }

    async fn deploy_contract(&self, _task: &Task) -> Result<DispatchReceipt, ChainError> {
        self.next_result().await
    }

    async fn multicall(&self, _task: &Task) -> Result<DispatchReceipt, ChainError> {
        self.next_result().await
    }

    fn sign(&self, secret: &[u8], task: &Task, nonce: u64) -> Result<SignedTransaction, ChainError> {
        if let Some(expected) = &self.expected_secret
            && expected.as_slice() != secret
        {
            return Err(ChainError::permanent("reassembled key does not match"));
        }
        Ok(SignedTransaction {
            contents: json!({ "task": task.id.to_string(), "nonce": nonce }),
            signatures: vec![format!("sig-{nonce}")],
        })
    }

    async fn replenish(&self, _task: &Task) -> Result<ReserveStatus, ChainError> {
        self.replenish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reserve
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReserveStatus::NotApplicable))
    }
}

type SaveFilter = Box<dyn Fn(&Task) -> bool + Send + Sync>;

/// Task store that keeps every saved version and can be told to refuse saves.
#[derive(Clone, Default)]
pub struct JournalingTaskStore {
    inner: InMemoryTaskStore,
    journal: Arc<Mutex<Vec<Task>>>,
    failing: Arc<Mutex<Option<(u32, SaveFilter)>>>,
}

impl JournalingTaskStore {
    pub fn new(inner: InMemoryTaskStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// The next `times` saves matching `filter` fail with a backend error.
    pub fn fail_saves(&self, times: u32, filter: impl Fn(&Task) -> bool + Send + Sync + 'static) {
        *self.failing.lock().unwrap() = Some((times, Box::new(filter)));
    }

    /// Every accepted save of `id`, oldest first.
    pub fn saved(&self, id: TaskId) -> Vec<Task> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|task| task.id == id)
            .cloned()
            .collect()
    }

    fn should_fail(&self, task: &Task) -> bool {
        let mut failing = self.failing.lock().unwrap();
        match failing.as_mut() {
            Some((times, filter)) if *times > 0 && filter(task) => {
                *times -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl TaskStore for JournalingTaskStore {
    async fn insert(&self, task: Task) -> Result<(), StoreError> {
        self.inner.insert(task).await
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.inner.get(id).await
    }

    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        if self.should_fail(task) {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.save(task).await?;
        self.journal.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<bool, StoreError> {
        self.inner.delete(id).await
    }

    async fn next_queued(&self, lane: &Lane) -> Result<Option<Task>, StoreError> {
        self.inner.next_queued(lane).await
    }

    async fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Task>, StoreError> {
        self.inner.find_by_tx_hash(tx_hash).await
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        self.inner.counts().await
    }
}

/// Config with millisecond timings so tests finish quickly.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        signer_slots: 3,
        dependency_wait_ms: 10,
        retry: RetryConfig {
            base_delay_ms: 1,
            multiplier: 2.0,
            max_delay_ms: 50,
        },
        alert_after_failures: 3,
        media_dir: std::env::temp_dir().join(format!("tessera-test-{}", TaskId::generate())),
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub app: Tessera,
    pub store: InMemoryTaskStore,
    pub journal: JournalingTaskStore,
    pub wallets: InMemoryWalletStore,
    pub escrow: InMemoryShareEscrow,
    pub alerts: RecordingAlertSink,
    pub hook: RecordingFinalizationHook,
    pub evm: Arc<ScriptedAdapter>,
    pub near: Arc<ScriptedAdapter>,
    pub project: ProjectId,
}

impl Harness {
    pub fn new(config: EngineConfig, evm: ScriptedAdapter, near: ScriptedAdapter) -> Self {
        Self::with_objects(config, evm, near, None)
    }

    pub fn with_objects(
        config: EngineConfig,
        evm: ScriptedAdapter,
        near: ScriptedAdapter,
        objects: Option<LocalObjectStore>,
    ) -> Self {
        let store = InMemoryTaskStore::new();
        let journal = JournalingTaskStore::new(store.clone());
        let wallets = InMemoryWalletStore::new();
        let escrow = InMemoryShareEscrow::new();
        let alerts = RecordingAlertSink::new();
        let hook = RecordingFinalizationHook::new();
        let evm = Arc::new(evm);
        let near = Arc::new(near);

        let mut builder = EngineBuilder::new(config)
            .task_store(Arc::new(journal.clone()))
            .wallet_store(Arc::new(wallets.clone()))
            .share_escrow(Arc::new(escrow.clone()))
            .alert_sink(Arc::new(alerts.clone()))
            .finalization_hook(Arc::new(hook.clone()))
            .register_adapter(evm.clone())
            .unwrap()
            .register_adapter(near.clone())
            .unwrap();
        if let Some(objects) = objects {
            builder = builder.object_store(Arc::new(objects));
        }

        Self {
            app: builder.build().unwrap(),
            store,
            journal,
            wallets,
            escrow,
            alerts,
            hook,
            evm,
            near,
            project: ProjectId::generate(),
        }
    }

    pub fn default_adapters() -> Self {
        Self::new(fast_config(), ScriptedAdapter::evm(), ScriptedAdapter::near())
    }

    pub async fn wallet(&self, chain: &str, multi_nonce: bool) -> Wallet {
        let wallet = Wallet::new(WalletId::generate(), self.project, Chain::new(chain))
            .with_multi_nonce(multi_nonce);
        crate::ports::WalletStore::save(&self.wallets, &wallet)
            .await
            .unwrap();
        wallet
    }

    pub fn transfer(&self, chain: &str, from: WalletId, amount: &str) -> NewTask {
        NewTask::new(
            self.project,
            Chain::new(chain),
            TaskPayload::Transfer(TransferParams {
                amount: amount.to_string(),
            }),
        )
        .from_wallet(from)
    }

    pub async fn task(&self, id: TaskId) -> Task {
        self.store.get(id).await.unwrap().unwrap()
    }

    /// Polls until the task reaches `state` or a second passes.
    pub async fn wait_for(&self, id: TaskId, state: TaskState) -> Task {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let task = self.task(id).await;
            if task.state == state || tokio::time::Instant::now() >= deadline {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Polls until the task is waiting on the indexer or a second passes.
    pub async fn wait_for_confirmation(&self, id: TaskId) -> Task {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let task = self.task(id).await;
            if task.is_awaiting_confirmation() || tokio::time::Instant::now() >= deadline {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}
