//! Splits chain failures into major (give up now) and transient (retry).

use crate::domain::{ChainError, ErrorKind};

/// Messages that mean retrying cannot help: lost authorization, a token
/// minted twice, a contract that panicked, a transfer by a non-owner.
pub const DEFAULT_MAJOR_ERROR_PATTERNS: &[&str] = &[
    "only owner can sign transactions",
    "already exist",
    "smart contract panicked",
    "not owner nor approved",
    "caller is not owner",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Major,
    Transient,
}

#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<String>,
}

impl ErrorClassifier {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// An explicit kind from the adapter wins over message matching.
    pub fn classify(&self, error: &ChainError) -> Severity {
        match error.kind() {
            Some(ErrorKind::Permanent) => Severity::Major,
            Some(ErrorKind::Transient) => Severity::Transient,
            Some(ErrorKind::Infrastructure) if error.is_missing_resource() => Severity::Major,
            Some(ErrorKind::Infrastructure) => Severity::Transient,
            None => {
                let message = error.message().to_lowercase();
                if self.patterns.iter().any(|p| message.contains(p.as_str())) {
                    Severity::Major
                } else {
                    Severity::Transient
                }
            }
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAJOR_ERROR_PATTERNS)
    }
}
