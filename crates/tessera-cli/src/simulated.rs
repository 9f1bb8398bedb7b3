//! In-process chain adapters for the demo.
//!
//! The EVM side confirms through the indexer, the NEAR side synchronously.
//! Every `fail_every`-th call fails with a transient RPC error so retries
//! show up in the logs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tessera_core::domain::{ChainError, ChainFamily, DispatchReceipt, SignedTransaction, Task};
use tessera_core::ports::{ChainAdapter, ReserveStatus, WalletDeployment};
use tracing::debug;
use zeroize::Zeroizing;

pub struct SimulatedChain {
    family: ChainFamily,
    latency: Duration,
    fail_every: u64,
    calls: AtomicU64,
}

impl SimulatedChain {
    pub fn evm(fail_every: u64) -> Self {
        Self::new(ChainFamily::Evm, fail_every)
    }

    pub fn near(fail_every: u64) -> Self {
        Self::new(ChainFamily::Near, fail_every)
    }

    fn new(family: ChainFamily, fail_every: u64) -> Self {
        Self {
            family,
            latency: Duration::from_millis(25),
            fail_every,
            calls: AtomicU64::new(0),
        }
    }

    async fn call(&self, task: &Task) -> Result<DispatchReceipt, ChainError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.latency).await;
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(ChainError::new(format!("{} rpc timeout", self.family)));
        }
        let tx_hash = match self.family {
            ChainFamily::Evm => format!("0x{}", hex::encode(task.id.as_ulid().to_bytes())),
            ChainFamily::Near => hex::encode(&task.id.as_ulid().to_bytes()[..8]),
        };
        debug!(task_id = %task.id, %tx_hash, "simulated call");
        Ok(DispatchReceipt::new().with_tx_hash(tx_hash).with_cost(21_000))
    }
}

#[async_trait]
impl ChainAdapter for SimulatedChain {
    fn family(&self) -> ChainFamily {
        self.family
    }

    fn confirms_synchronously(&self) -> bool {
        self.family == ChainFamily::Near
    }

    async fn deploy_wallet(&self, task: &Task) -> Result<WalletDeployment, ChainError> {
        let receipt = self.call(task).await?;
        let ulid = task.id.as_ulid().to_string().to_lowercase();
        let (address, account_id) = match self.family {
            ChainFamily::Evm => (format!("0x{}", hex::encode(task.id.as_ulid().to_bytes())), None),
            ChainFamily::Near => (format!("{ulid}.tessera.testnet"), Some(format!("{ulid}.tessera.testnet"))),
        };
        Ok(WalletDeployment {
            address,
            account_id,
            secret: Some(Zeroizing::new(task.id.as_ulid().to_bytes().to_vec())),
            tx_hash: receipt.tx_hash,
            cost: receipt.cost,
        })
    }

    async fn deploy_contract(&self, task: &Task) -> Result<DispatchReceipt, ChainError> {
        self.call(task).await
    }

    async fn multicall(&self, task: &Task) -> Result<DispatchReceipt, ChainError> {
        self.call(task).await
    }

    fn sign(&self, secret: &[u8], task: &Task, nonce: u64) -> Result<SignedTransaction, ChainError> {
        let mut digest = [0u8; 8];
        for (i, byte) in secret.iter().enumerate() {
            digest[i % 8] ^= byte.rotate_left(nonce as u32 % 8);
        }
        Ok(SignedTransaction {
            contents: json!({ "task": task.id.to_string(), "nonce": nonce }),
            signatures: vec![hex::encode(digest)],
        })
    }

    async fn replenish(&self, _task: &Task) -> Result<ReserveStatus, ChainError> {
        Ok(match self.family {
            ChainFamily::Near => ReserveStatus::ToppedUp,
            ChainFamily::Evm => ReserveStatus::NotApplicable,
        })
    }
}
