//! EngineBuilder: wires ports, adapters and config into a running engine.

use std::sync::Arc;

use crate::app::adapters::{AdapterRegistry, RegistryError};
use crate::app::classify::ErrorClassifier;
use crate::app::config::{ConfigError, EngineConfig};
use crate::app::dispatch::ChainDispatcher;
use crate::app::engine::{EngineInner, TaskEngine};
use crate::app::lanes::LaneCoordinator;
use crate::app::media::MediaStager;
use crate::app::reconciler::CompletionReconciler;
use crate::app::retry::RetryPolicy;
use crate::app::submission::{SlotSelector, TaskSubmitter};
use crate::app::wallet_lock::WalletLocks;
use crate::custody::KeyCustodian;
use crate::domain::ChainFamily;
use crate::impls::{
    InMemoryShareEscrow, InMemoryTaskStore, InMemoryWalletStore, LocalObjectStore,
    NoopFinalizationHook, TracingAlertSink,
};
use crate::ports::{
    AlertSink, ChainAdapter, Clock, FinalizationHook, IdGenerator, ObjectStore, ShareEscrow,
    SystemClock, TaskStore, UlidGenerator, WalletStore,
};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing adapters for chain families {0:?}")]
    MissingAdapters(Vec<ChainFamily>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Ports left unset fall back to in-memory or local implementations.
///
/// ```ignore
/// let tessera = EngineBuilder::new(config)
///     .register_adapter(Arc::new(near))?
///     .register_adapter(Arc::new(evm))?
///     .expect_families(&[ChainFamily::Near, ChainFamily::Evm])
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    adapters: AdapterRegistry,
    expected: Vec<ChainFamily>,
    store: Option<Arc<dyn TaskStore>>,
    wallets: Option<Arc<dyn WalletStore>>,
    objects: Option<Arc<dyn ObjectStore>>,
    escrow: Option<Arc<dyn ShareEscrow>>,
    alerts: Option<Arc<dyn AlertSink>>,
    hook: Option<Arc<dyn FinalizationHook>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            adapters: AdapterRegistry::new(),
            expected: Vec::new(),
            store: None,
            wallets: None,
            objects: None,
            escrow: None,
            alerts: None,
            hook: None,
            clock: None,
            ids: None,
        }
    }

    pub fn register_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Result<Self, RegistryError> {
        self.adapters.register(adapter)?;
        Ok(self)
    }

    /// `build` fails unless every listed family has an adapter.
    pub fn expect_families(mut self, families: &[ChainFamily]) -> Self {
        self.expected = families.to_vec();
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn wallet_store(mut self, wallets: Arc<dyn WalletStore>) -> Self {
        self.wallets = Some(wallets);
        self
    }

    pub fn object_store(mut self, objects: Arc<dyn ObjectStore>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn share_escrow(mut self, escrow: Arc<dyn ShareEscrow>) -> Self {
        self.escrow = Some(escrow);
        self
    }

    pub fn alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn finalization_hook(mut self, hook: Arc<dyn FinalizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<Tessera, BuildError> {
        let config = self.config;
        config.validate()?;

        let registered = self.adapters.families();
        let missing: Vec<ChainFamily> = self
            .expected
            .iter()
            .filter(|family| !registered.contains(*family))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingAdapters(missing));
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let wallets = self
            .wallets
            .unwrap_or_else(|| Arc::new(InMemoryWalletStore::new()));
        let objects = self
            .objects
            .unwrap_or_else(|| Arc::new(LocalObjectStore::new(config.media_dir.join("objects"))));
        let escrow = self
            .escrow
            .unwrap_or_else(|| Arc::new(InMemoryShareEscrow::new()));
        let alerts = self.alerts.unwrap_or_else(|| Arc::new(TracingAlertSink));
        let hook = self.hook.unwrap_or_else(|| Arc::new(NoopFinalizationHook));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));

        let custodian = KeyCustodian::new(config.share_scheme)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let dispatcher = ChainDispatcher {
            adapters: self.adapters.clone(),
            store: Arc::clone(&store),
            wallets: Arc::clone(&wallets),
            escrow,
            custodian: custodian.clone(),
            media: MediaStager::new(objects, config.media_dir.join("staging")),
            classifier: ErrorClassifier::new(&config.major_error_patterns),
            retry: RetryPolicy::from(&config.retry),
            alerts: Arc::clone(&alerts),
            clock: Arc::clone(&clock),
            alert_after_failures: config.alert_after_failures,
            max_attempts: config.max_attempts,
        };

        let engine = TaskEngine::new(EngineInner {
            store: Arc::clone(&store),
            dispatcher,
            lanes: LaneCoordinator::new(),
            alerts,
            hook,
            clock: Arc::clone(&clock),
            dependency_wait: config.dependency_wait(),
            indexer_webhooks: config.indexer_webhooks,
        });

        let submitter = TaskSubmitter {
            store: Arc::clone(&store),
            wallets: Arc::clone(&wallets),
            adapters: self.adapters,
            locks: WalletLocks::new(),
            custodian,
            slots: SlotSelector::new(config.signer_slots),
            ids,
            clock,
            engine: engine.clone(),
        };

        Ok(Tessera {
            reconciler: CompletionReconciler::new(engine.clone()),
            submitter: Arc::new(submitter),
            engine,
            store,
            wallets,
            config,
        })
    }
}

/// A wired engine: submit tasks, feed indexer notifications, inspect state.
pub struct Tessera {
    pub engine: TaskEngine,
    pub submitter: Arc<TaskSubmitter>,
    pub reconciler: CompletionReconciler,
    pub store: Arc<dyn TaskStore>,
    pub wallets: Arc<dyn WalletStore>,
    pub config: EngineConfig,
}
