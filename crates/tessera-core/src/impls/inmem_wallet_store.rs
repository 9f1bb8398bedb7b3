//! In-memory WalletStore and ShareEscrow.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::custody::Share;
use crate::domain::{SignerSlot, Wallet, WalletId};
use crate::ports::{ShareEscrow, StoreError, WalletStore};

#[derive(Clone, Default)]
pub struct InMemoryWalletStore {
    wallets: Arc<Mutex<HashMap<WalletId, Wallet>>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn get(&self, id: WalletId) -> Result<Option<Wallet>, StoreError> {
        Ok(self.wallets.lock().await.get(&id).cloned())
    }

    async fn save(&self, wallet: &Wallet) -> Result<(), StoreError> {
        self.wallets.lock().await.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn nonce(&self, id: WalletId, counter: SignerSlot) -> Result<u64, StoreError> {
        let wallets = self.wallets.lock().await;
        let wallet = wallets
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(wallet.nonce(counter))
    }

    async fn set_nonce(&self, id: WalletId, counter: SignerSlot, value: u64) -> Result<(), StoreError> {
        let mut wallets = self.wallets.lock().await;
        let wallet = wallets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        wallet.nonces.insert(counter, value);
        Ok(())
    }
}

/// Platform escrow held in memory.
#[derive(Clone, Default)]
pub struct InMemoryShareEscrow {
    shares: Arc<Mutex<HashMap<WalletId, Share>>>,
}

impl InMemoryShareEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, wallet: WalletId) -> Option<Share> {
        self.shares.lock().await.get(&wallet).cloned()
    }
}

#[async_trait]
impl ShareEscrow for InMemoryShareEscrow {
    async fn store(&self, wallet: WalletId, share: &Share) -> Result<(), StoreError> {
        self.shares.lock().await.insert(wallet, share.clone());
        Ok(())
    }
}
