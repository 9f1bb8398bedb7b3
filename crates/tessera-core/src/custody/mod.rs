//! Threshold key custody.
//!
//! Wallet keys are split with Shamir's scheme over GF(256); no single party
//! holds a key, and the reassembled key never leaves a closure scope.

pub mod custodian;
pub mod gf256;
pub mod shamir;

pub use self::custodian::{KeyCustodian, ShareBundle, ShareScheme};
pub use self::shamir::{Share, combine, recover_share, split};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CustodyError {
    #[error("cannot split an empty secret")]
    EmptySecret,

    #[error("invalid share scheme: threshold {threshold} of {total} (need 2 <= threshold <= total)")]
    InvalidScheme { total: u8, threshold: u8 },

    #[error("not enough shares: have {have}, need {need}")]
    InsufficientShares { have: usize, need: usize },

    #[error("share {0} given more than once")]
    DuplicateShare(u8),

    #[error("shares come from different splits")]
    InconsistentShares,

    #[error("malformed share: {0}")]
    MalformedShare(String),
}
