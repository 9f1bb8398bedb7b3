//! App layer: wires the ports into the task engine.
//!
//! - **EngineBuilder**: assembles stores, adapters and config into [`Tessera`]
//! - **TaskSubmitter**: creates, queues and co-signs tasks
//! - **TaskEngine**: drains lanes in FIFO order
//! - **ChainDispatcher**: per-task adapter calls, retries and healing
//! - **CompletionReconciler**: finalizes tasks from indexer notifications

pub mod adapters;
pub mod builder;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod lanes;
pub mod media;
pub mod reconciler;
pub mod retry;
pub mod status;
pub mod submission;
pub mod wallet_lock;

#[cfg(test)]
pub(crate) mod testkit;

pub use self::adapters::{AdapterRegistry, RegistryError};
pub use self::builder::{BuildError, EngineBuilder, Tessera};
pub use self::classify::{ErrorClassifier, Severity};
pub use self::config::{ConfigError, EngineConfig, RetryConfig};
pub use self::dispatch::{ChainDispatcher, DispatchError, Dispatched};
pub use self::engine::{EngineError, ExecuteOutcome, StepOutcome, TaskEngine};
pub use self::lanes::{LaneClaim, LaneCoordinator};
pub use self::media::MediaStager;
pub use self::reconciler::{CompletionReconciler, ConfirmationStatus, IndexerNotification, ReconcileOutcome};
pub use self::retry::RetryPolicy;
pub use self::status::TaskCounts;
pub use self::submission::{SlotSelector, SubmitError, TaskSubmitter};
pub use self::wallet_lock::{WalletLockGuard, WalletLocks};
