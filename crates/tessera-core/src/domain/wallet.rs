//! Tenant wallets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, WalletId};
use super::lane::{Chain, SignerSlot};
use crate::custody::Share;

/// A tenant wallet. The wallet never holds its raw key, only its own share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub project_id: ProjectId,
    pub chain: Chain,
    /// Filled in once the wallet is deployed.
    pub address: Option<String>,
    /// NEAR account name.
    pub account_id: Option<String>,
    /// Whether the wallet keeps one nonce counter per signer slot.
    pub multi_nonce: bool,
    /// Next nonce per counter slot.
    #[serde(default)]
    pub nonces: BTreeMap<SignerSlot, u64>,
    pub key_share: Option<Share>,
}

impl Wallet {
    pub fn new(id: WalletId, project_id: ProjectId, chain: Chain) -> Self {
        Self {
            id,
            project_id,
            chain,
            address: None,
            account_id: None,
            multi_nonce: false,
            nonces: BTreeMap::new(),
            key_share: None,
        }
    }

    pub fn with_multi_nonce(mut self, multi_nonce: bool) -> Self {
        self.multi_nonce = multi_nonce;
        self
    }

    pub fn with_key_share(mut self, share: Share) -> Self {
        self.key_share = Some(share);
        self
    }

    /// Nonce counter used when this wallet signs for `slot`.
    pub fn counter_slot(&self, slot: SignerSlot) -> SignerSlot {
        if self.multi_nonce {
            slot
        } else {
            SignerSlot::SHARED
        }
    }

    pub fn nonce(&self, counter: SignerSlot) -> u64 {
        self.nonces.get(&counter).copied().unwrap_or(0)
    }
}
