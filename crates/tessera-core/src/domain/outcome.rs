//! Results of dispatching a task and of signing a transaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a successful chain or storage call produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,

    /// Fee paid, in the chain's smallest unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u128>,

    /// Kind-specific result: deployed address, tenant key share, URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl DispatchReceipt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_cost(mut self, cost: u128) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }
}

/// Transaction contents signed ahead of queuing, submitted later through multicall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub contents: Value,
    pub signatures: Vec<String>,
}

/// How a task's final status becomes known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finality {
    /// The call's return value is final.
    Confirmed,
    /// Final status arrives later from the chain indexer.
    Deferred,
}
