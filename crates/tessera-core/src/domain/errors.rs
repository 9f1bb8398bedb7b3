//! Error classification for chain and storage failures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operational classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Worth retrying: timeouts, congestion, underpriced gas.
    Transient,
    /// Retrying cannot help: authorization, duplicate token, contract panic.
    Permanent,
    /// Local infrastructure (store, object storage, network) failed.
    Infrastructure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Infrastructure => "infrastructure",
        };
        f.write_str(label)
    }
}

/// Failure reported by a chain adapter or by a dispatch precondition.
///
/// Adapters that know what went wrong set `kind`; adapters that only have an
/// error string leave it empty and the message is classified by pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ChainError {
    kind: Option<ErrorKind>,
    message: String,
    missing_resource: bool,
}

impl ChainError {
    /// Unclassified error; the message decides.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: message.into(),
            missing_resource: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Transient)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Permanent)
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::new(message).with_kind(ErrorKind::Infrastructure)
    }

    /// Infrastructure error for a resource that provably does not exist.
    pub fn missing(message: impl Into<String>) -> Self {
        Self {
            missing_resource: true,
            ..Self::infrastructure(message)
        }
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_missing_resource(&self) -> bool {
        self.missing_resource
    }
}
