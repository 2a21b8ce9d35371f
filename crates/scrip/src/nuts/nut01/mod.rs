//! NUT-01: Mint public key exchange
//!
//! <https://github.com/cashubtc/nuts/blob/main/01.md>

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod public_key;
mod secret_key;

pub use self::public_key::PublicKey;
pub use self::secret_key::SecretKey;
use super::nut02::KeySet;
use crate::amount::{Amount, AmountStr};

/// Nut01 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// Invalid public key size
    #[error("Invalid public key size: expected={expected}, found={found}")]
    InvalidPublicKeySize {
        /// Expected size
        expected: usize,
        /// Actual size
        found: usize,
    },
    /// Hex error
    #[error(transparent)]
    Hex(#[from] crate::util::hex::Error),
}

/// Mint public keys per amount
///
/// Keyed by the power-of-two denomination each key signs for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Keys(BTreeMap<AmountStr, PublicKey>);

impl Keys {
    /// Create new [`Keys`]
    #[inline]
    pub fn new(keys: BTreeMap<Amount, PublicKey>) -> Self {
        Self(
            keys.into_iter()
                .map(|(amount, key)| (AmountStr::from(amount), key))
                .collect(),
        )
    }

    /// Get [`PublicKey`] for [`Amount`]
    #[inline]
    pub fn amount_key(&self, amount: Amount) -> Option<PublicKey> {
        self.0.get(&AmountStr::from(amount)).copied()
    }

    /// Iterate through the `(Amount, PublicKey)` entries in the map
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Amount, &PublicKey)> {
        self.0.iter().map(|(amt, key)| (Amount::from(*amt), key))
    }

    /// Amounts the keyset can sign for
    #[inline]
    pub fn amounts(&self) -> Vec<Amount> {
        self.0.keys().map(|amt| Amount::from(*amt)).collect()
    }

    /// Number of keys
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key map is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Mint key response [NUT-01]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Keysets
    pub keysets: Vec<KeySet>,
}
