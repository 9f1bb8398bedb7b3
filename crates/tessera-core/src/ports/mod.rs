//! Ports: the traits the engine talks to. Chain SDKs, databases, object
//! storage and alerting live behind these.

pub mod alert_sink;
pub mod chain_adapter;
pub mod clock;
pub mod finalization;
pub mod id_generator;
pub mod object_store;
pub mod share_escrow;
pub mod task_store;
pub mod wallet_store;

pub use self::alert_sink::AlertSink;
pub use self::chain_adapter::{ChainAdapter, ReserveStatus, WalletDeployment};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::finalization::FinalizationHook;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::object_store::{ObjectStore, ObjectStoreError};
pub use self::share_escrow::ShareEscrow;
pub use self::task_store::{StoreError, TaskStore};
pub use self::wallet_store::WalletStore;
