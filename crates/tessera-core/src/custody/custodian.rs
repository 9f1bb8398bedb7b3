//! Key custody: wallets are provisioned as shares and reassembled only for
//! the duration of a signing closure.

use serde::{Deserialize, Serialize};

use super::CustodyError;
use super::shamir::{self, Share};

/// Split layout: how many shares are produced and how many rebuild the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareScheme {
    pub total: u8,
    pub threshold: u8,
}

impl Default for ShareScheme {
    fn default() -> Self {
        Self {
            total: 3,
            threshold: 2,
        }
    }
}

impl ShareScheme {
    pub fn validate(&self) -> Result<(), CustodyError> {
        if self.threshold < 2 || self.threshold > self.total {
            return Err(CustodyError::InvalidScheme {
                total: self.total,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}

/// Where each share of a freshly provisioned key goes.
#[derive(Debug, Clone)]
pub struct ShareBundle {
    /// Stored on the wallet record.
    pub wallet: Share,
    /// Returned to the tenant.
    pub tenant: Vec<Share>,
    /// Escrowed by the platform.
    pub platform: Share,
}

#[derive(Debug, Clone, Default)]
pub struct KeyCustodian {
    scheme: ShareScheme,
}

impl KeyCustodian {
    pub fn new(scheme: ShareScheme) -> Result<Self, CustodyError> {
        scheme.validate()?;
        Ok(Self { scheme })
    }

    pub fn scheme(&self) -> ShareScheme {
        self.scheme
    }

    /// Splits a new key. The first share belongs to the wallet, the last to
    /// the platform, the ones in between to the tenant.
    pub fn provision(&self, secret: &[u8]) -> Result<ShareBundle, CustodyError> {
        let mut shares = shamir::split(secret, self.scheme.total, self.scheme.threshold)?;
        let platform = shares.pop().ok_or(CustodyError::InvalidScheme {
            total: self.scheme.total,
            threshold: self.scheme.threshold,
        })?;
        let mut rest = shares.into_iter();
        let wallet = rest.next().ok_or(CustodyError::InvalidScheme {
            total: self.scheme.total,
            threshold: self.scheme.threshold,
        })?;
        Ok(ShareBundle {
            wallet,
            tenant: rest.collect(),
            platform,
        })
    }

    /// Rebuilds the key, hands it to `f`, and wipes it when `f` returns.
    pub fn with_secret<R>(
        &self,
        shares: &[Share],
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, CustodyError> {
        let secret = shamir::combine(shares)?;
        Ok(f(&secret))
    }
}
