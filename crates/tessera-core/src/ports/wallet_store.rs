//! WalletStore port: wallet records and their nonce counters.

use async_trait::async_trait;

use super::task_store::StoreError;
use crate::domain::{SignerSlot, Wallet, WalletId};

/// Nonce reads and writes are separate calls and are not atomic with each
/// other. Callers serialize read-then-increment through `WalletLocks`.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get(&self, id: WalletId) -> Result<Option<Wallet>, StoreError>;

    /// Inserts or replaces the wallet record.
    async fn save(&self, wallet: &Wallet) -> Result<(), StoreError>;

    async fn nonce(&self, id: WalletId, counter: SignerSlot) -> Result<u64, StoreError>;

    async fn set_nonce(&self, id: WalletId, counter: SignerSlot, value: u64) -> Result<(), StoreError>;
}
