//! ChainAdapter port: one implementation per chain family.

use std::fmt;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::domain::{ChainError, ChainFamily, DispatchReceipt, SignedTransaction, Task};

/// Result of deploying a tenant wallet.
pub struct WalletDeployment {
    pub address: String,
    /// NEAR account name.
    pub account_id: Option<String>,
    /// Freshly generated key, when the adapter created one. Split into
    /// shares right away and wiped on drop.
    pub secret: Option<Zeroizing<Vec<u8>>>,
    pub tx_hash: Option<String>,
    pub cost: Option<u128>,
}

impl fmt::Debug for WalletDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletDeployment")
            .field("address", &self.address)
            .field("account_id", &self.account_id)
            .field("has_secret", &self.secret.is_some())
            .field("tx_hash", &self.tx_hash)
            .field("cost", &self.cost)
            .finish()
    }
}

/// Outcome of a reserve check between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveStatus {
    /// The adapter has no reserve for this kind of task.
    NotApplicable,
    /// The reserve was already enough, so the failure was not a funding problem.
    Sufficient,
    /// The reserve was low and has been topped up.
    ToppedUp,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// True when a successful call is final; false when the indexer reports later.
    fn confirms_synchronously(&self) -> bool;

    async fn deploy_wallet(&self, task: &Task) -> Result<WalletDeployment, ChainError>;

    async fn deploy_contract(&self, task: &Task) -> Result<DispatchReceipt, ChainError>;

    /// Mint, transfer and royalty operations.
    async fn multicall(&self, task: &Task) -> Result<DispatchReceipt, ChainError>;

    /// Signs the task's transaction ahead of queuing with a reassembled key.
    fn sign(&self, _secret: &[u8], task: &Task, _nonce: u64) -> Result<SignedTransaction, ChainError> {
        Err(ChainError::permanent(format!(
            "{} adapter does not sign {} transactions offline",
            self.family(),
            task.kind()
        )))
    }

    /// Tops up the account paying for `task` if it runs low.
    async fn replenish(&self, _task: &Task) -> Result<ReserveStatus, ChainError> {
        Ok(ReserveStatus::NotApplicable)
    }
}
