//! FinalizationHook port: domain follow-up once a task reaches a final state
//! (marking an NFT minted, recording a deployed contract address, ...).

use async_trait::async_trait;

use crate::domain::Task;

#[async_trait]
pub trait FinalizationHook: Send + Sync {
    async fn on_finalized(&self, task: &Task);
}
