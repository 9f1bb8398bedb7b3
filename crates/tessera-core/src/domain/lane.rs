//! Chains, signer slots and lanes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two families of chains the engine can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// Account-based chains with externally managed nonces. Final status
    /// normally arrives from an indexer.
    Evm,
    /// Account abstraction built in; the call itself returns final status.
    Near,
}

impl ChainFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Near => "near",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network identifier such as `polygon`, `mumbai` or `near.testnet`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chain(String);

impl Chain {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NEAR networks are named `near` or `near.<network>`; everything else is EVM.
    pub fn family(&self) -> ChainFamily {
        if self.0 == "near" || self.0.starts_with("near.") {
            ChainFamily::Near
        } else {
            ChainFamily::Evm
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index of one of the pooled master signers. Slot 0 doubles as the shared
/// nonce counter of single-nonce wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerSlot(u32);

impl SignerSlot {
    pub const SHARED: SignerSlot = SignerSlot(0);

    pub const fn new(slot: u32) -> Self {
        Self(slot)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SignerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialization domain: at most one task runs per lane at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lane {
    pub chain: Chain,
    pub slot: SignerSlot,
}

impl Lane {
    pub fn new(chain: Chain, slot: SignerSlot) -> Self {
        Self { chain, slot }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.chain, self.slot)
    }
}
