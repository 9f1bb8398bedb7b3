//! Shamir secret sharing over GF(256), one polynomial per secret byte.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use super::CustodyError;
use super::gf256;

/// One share of a split secret.
///
/// Text form is `tt ii <hex>` written without spaces: two hex digits of
/// threshold, two of share id, then the share bytes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Share {
    threshold: u8,
    id: u8,
    data: Vec<u8>,
}

impl Share {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for Share {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("threshold", &self.threshold)
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}{}", self.threshold, self.id, hex::encode(&self.data))
    }
}

impl FromStr for Share {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Zeroizing::new(
            hex::decode(s.trim()).map_err(|e| CustodyError::MalformedShare(e.to_string()))?,
        );
        let [threshold, id, data @ ..] = bytes.as_slice() else {
            return Err(CustodyError::MalformedShare("share is too short".into()));
        };
        if *id == 0 {
            return Err(CustodyError::MalformedShare("share id 0 is reserved".into()));
        }
        if data.is_empty() {
            return Err(CustodyError::MalformedShare("share carries no data".into()));
        }
        Ok(Share {
            threshold: *threshold,
            id: *id,
            data: data.to_vec(),
        })
    }
}

impl TryFrom<String> for Share {
    type Error = CustodyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = Zeroizing::new(value);
        value.parse()
    }
}

impl From<Share> for String {
    fn from(share: Share) -> Self {
        share.to_string()
    }
}

/// Splits `secret` into `total` shares, any `threshold` of which rebuild it.
pub fn split(secret: &[u8], total: u8, threshold: u8) -> Result<Vec<Share>, CustodyError> {
    if secret.is_empty() {
        return Err(CustodyError::EmptySecret);
    }
    if threshold < 2 || threshold > total {
        return Err(CustodyError::InvalidScheme { total, threshold });
    }

    let mut rng = rand::thread_rng();
    let mut shares: Vec<Share> = (1..=total)
        .map(|id| Share {
            threshold,
            id,
            data: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut coefficients = Zeroizing::new(vec![0u8; threshold as usize]);
    for &byte in secret {
        rng.fill_bytes(&mut coefficients[1..]);
        coefficients[0] = byte;
        for share in shares.iter_mut() {
            share.data.push(gf256::eval(&coefficients, share.id));
        }
    }
    Ok(shares)
}

/// Rebuilds the secret. Fails rather than returning a wrong secret when the
/// shares are too few, duplicated, or from different splits.
pub fn combine(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>, CustodyError> {
    let quorum = quorum(shares)?;
    interpolate_at(&quorum, 0).map(Zeroizing::new)
}

/// Regenerates the share with the given id from a quorum of others.
pub fn recover_share(id: u8, shares: &[Share]) -> Result<Share, CustodyError> {
    if id == 0 {
        return Err(CustodyError::MalformedShare("share id 0 is reserved".into()));
    }
    let quorum = quorum(shares)?;
    let data = interpolate_at(&quorum, id)?;
    Ok(Share {
        threshold: quorum[0].threshold,
        id,
        data,
    })
}

/// Validates `shares` and returns exactly `threshold` of them.
fn quorum(shares: &[Share]) -> Result<Vec<&Share>, CustodyError> {
    let Some(first) = shares.first() else {
        return Err(CustodyError::InsufficientShares { have: 0, need: 2 });
    };
    let mut seen = BTreeSet::new();
    for share in shares {
        if share.threshold != first.threshold || share.data.len() != first.data.len() {
            return Err(CustodyError::InconsistentShares);
        }
        if !seen.insert(share.id) {
            return Err(CustodyError::DuplicateShare(share.id));
        }
    }
    let need = first.threshold as usize;
    if shares.len() < need {
        return Err(CustodyError::InsufficientShares {
            have: shares.len(),
            need,
        });
    }
    Ok(shares.iter().take(need).collect())
}

fn interpolate_at(quorum: &[&Share], x: u8) -> Result<Vec<u8>, CustodyError> {
    let len = quorum[0].data.len();
    let mut points = vec![(0u8, 0u8); quorum.len()];
    let mut out = Vec::with_capacity(len);
    for byte in 0..len {
        for (point, share) in points.iter_mut().zip(quorum) {
            *point = (share.id, share.data[byte]);
        }
        let value = gf256::interpolate(&points, x).ok_or(CustodyError::InconsistentShares)?;
        out.push(value);
    }
    Ok(out)
}
