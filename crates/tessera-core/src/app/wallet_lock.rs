//! Per-wallet, per-nonce-counter mutual exclusion for nonce capture.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::{SignerSlot, WalletId};

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Keyed async mutex. Hold a guard only across task creation and the nonce
/// read-and-increment; release before signing or submitting.
#[derive(Debug, Clone, Default)]
pub struct WalletLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(wallet: WalletId, slot: SignerSlot) -> String {
        format!("{wallet}:{slot}")
    }

    /// Waits until the `(wallet, slot)` key is free and takes it.
    pub async fn lock(&self, wallet: WalletId, slot: SignerSlot) -> WalletLockGuard {
        let key = Self::key(wallet, slot);
        let mutex = Arc::clone(self.map().entry(key.clone()).or_default());
        let guard = mutex.lock_owned().await;
        WalletLockGuard {
            key,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Keys with a holder or a waiter.
    pub fn active(&self) -> usize {
        self.map().len()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct WalletLockGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
}

impl WalletLockGuard {
    pub fn unlock(self) {}
}

impl Drop for WalletLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the Arc under the map lock, so a count of one means
        // nobody else holds or awaits this key.
        if map
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            map.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = WalletLocks::new();
        let wallet = WalletId::generate();
        let guard = locks.lock(wallet, SignerSlot::new(1)).await;

        let entered = Arc::new(AtomicBool::new(false));
        let waiter = {
            let locks = locks.clone();
            let entered = Arc::clone(&entered);
            tokio::spawn(async move {
                let _guard = locks.lock(wallet, SignerSlot::new(1)).await;
                entered.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!entered.load(Ordering::SeqCst));

        guard.unlock();
        waiter.await.unwrap();
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn different_slots_do_not_block() {
        let locks = WalletLocks::new();
        let wallet = WalletId::generate();
        let _one = locks.lock(wallet, SignerSlot::new(1)).await;

        let two = tokio::time::timeout(Duration::from_millis(100), locks.lock(wallet, SignerSlot::new(2))).await;
        assert!(two.is_ok());
    }

    #[tokio::test]
    async fn entries_are_removed_when_released() {
        let locks = WalletLocks::new();
        let guard = locks.lock(WalletId::generate(), SignerSlot::SHARED).await;
        assert_eq!(locks.active(), 1);

        drop(guard);
        assert_eq!(locks.active(), 0);
    }
}
