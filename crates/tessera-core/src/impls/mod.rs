//! Port implementations for development, tests and the CLI demo.
//!
//! Production backends (SQL task store, S3/Arweave object store, chain SDK
//! adapters) live in their own crates and implement the same ports.

pub mod alerts;
pub mod hooks;
pub mod inmem_task_store;
pub mod inmem_wallet_store;
pub mod local_object_store;

pub use self::alerts::{Alert, RecordingAlertSink, TracingAlertSink};
pub use self::hooks::{NoopFinalizationHook, RecordingFinalizationHook};
pub use self::inmem_task_store::InMemoryTaskStore;
pub use self::inmem_wallet_store::{InMemoryShareEscrow, InMemoryWalletStore};
pub use self::local_object_store::LocalObjectStore;
