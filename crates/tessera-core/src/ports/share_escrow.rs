//! ShareEscrow port: the platform's copy of each wallet key share.

use async_trait::async_trait;

use super::task_store::StoreError;
use crate::custody::Share;
use crate::domain::WalletId;

#[async_trait]
pub trait ShareEscrow: Send + Sync {
    async fn store(&self, wallet: WalletId, share: &Share) -> Result<(), StoreError>;
}
