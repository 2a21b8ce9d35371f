//! NUT-14: Hashed Time Lock Contracts (HTLC)
//!
//! <https://github.com/cashubtc/nuts/blob/main/14.md>

use std::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::schnorr::Signature;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{Proof, Witness};
use super::nut10::{Kind, Secret as Nut10Secret};
use super::nut11::{valid_signatures, Conditions};
use super::SecretKey;
use crate::util::{hex, unix_time};

pub mod serde_htlc_witness;

/// NUT14 Errors
#[derive(Debug, Error)]
pub enum Error {
    /// Incorrect secret kind
    #[error("Secret is not a HTLC secret")]
    IncorrectSecretKind,
    /// Incorrect witness kind
    #[error("Witness is not a HTLC witness")]
    IncorrectWitnessKind,
    /// Hash lock is not valid
    #[error("Hash lock is not valid")]
    InvalidHash,
    /// Preimage does not match
    #[error("Preimage does not match")]
    Preimage,
    /// Witness Signatures not provided
    #[error("Witness did not provide signatures")]
    SignaturesNotProvided,
    /// Signing key is not a required witness
    #[error("Signature from key is not required")]
    SignatureNotRequired,
    /// Spend conditions not met
    #[error("HTLC spend conditions are not met")]
    SpendConditionsNotMet,
    /// NUT11 Error
    #[error(transparent)]
    NUT11(#[from] super::nut11::Error),
    /// NUT10 Error
    #[error(transparent)]
    NUT10(#[from] super::nut10::Error),
    #[error(transparent)]
    /// Serde Error
    Serde(#[from] serde_json::Error),
}

/// HTLC Witness
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HTLCWitness {
    /// Preimage
    pub preimage: String,
    /// Signatures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,
}

/// Whether two hashes are equal, in constant time
fn hash_eq(a: &Sha256Hash, b: &Sha256Hash) -> bool {
    a.to_byte_array()
        .iter()
        .zip(b.to_byte_array().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

impl Proof {
    /// Verify HTLC
    ///
    /// Before the locktime spending requires the preimage of the hash lock
    /// plus any multisig the secret demands. After the locktime the refund
    /// keys can spend with signatures alone.
    pub fn verify_htlc(&self) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret).try_into()?;
        if secret.kind != Kind::HTLC {
            return Err(Error::IncorrectSecretKind);
        }

        let conditions: Conditions = secret
            .secret_data
            .tags
            .clone()
            .unwrap_or_default()
            .try_into()?;

        let msg: &[u8] = self.secret.as_bytes();

        let witness_signatures: Vec<Signature> = self
            .witness
            .as_ref()
            .and_then(|witness| witness.signatures())
            .unwrap_or_default()
            .iter()
            .flat_map(|s| Signature::from_str(s))
            .collect();

        // Refund path
        if let Some(locktime) = conditions.locktime {
            if locktime <= unix_time() {
                match &conditions.refund_keys {
                    Some(refund_keys) => {
                        let required = conditions.num_sigs_refund.unwrap_or(1);
                        if valid_signatures(msg, refund_keys, &witness_signatures) >= required {
                            return Ok(());
                        }
                    }
                    // Expired with no refund keys is spendable by anyone
                    None => return Ok(()),
                }
            }
        }

        // Hashlock path
        let htlc_witness = match &self.witness {
            Some(Witness::HTLCWitness(witness)) => witness,
            _ => return Err(Error::IncorrectWitnessKind),
        };

        let hash_lock =
            Sha256Hash::from_str(&secret.secret_data.data).map_err(|_| Error::InvalidHash)?;

        let preimage = hex::decode(&htlc_witness.preimage).map_err(|_| Error::Preimage)?;
        let preimage_hash = Sha256Hash::hash(&preimage);

        if !hash_eq(&hash_lock, &preimage_hash) {
            return Err(Error::Preimage);
        }

        if let Some(pubkeys) = &conditions.pubkeys {
            let required = conditions.num_sigs.unwrap_or(1);

            if witness_signatures.is_empty() {
                return Err(Error::SignaturesNotProvided);
            }

            if valid_signatures(msg, pubkeys, &witness_signatures) < required {
                return Err(Error::SpendConditionsNotMet);
            }
        }

        Ok(())
    }

    /// Add Preimage
    ///
    /// Any signatures already on the witness are preserved.
    pub fn add_preimage(&mut self, preimage: String) {
        let signatures = self
            .witness
            .as_ref()
            .and_then(|witness| witness.signatures());
        self.witness = Some(Witness::HTLCWitness(HTLCWitness {
            preimage,
            signatures,
        }))
    }

    /// Sign [Proof] with an HTLC secret
    ///
    /// The key must be among the main pubkeys before the locktime, or the
    /// refund keys after it.
    pub fn sign_htlc(&mut self, secret_key: SecretKey) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret).try_into()?;
        if secret.kind != Kind::HTLC {
            return Err(Error::IncorrectSecretKind);
        }

        let conditions: Conditions = secret
            .secret_data
            .tags
            .clone()
            .unwrap_or_default()
            .try_into()?;

        let locked = conditions.locktime.map(|l| l > unix_time()).unwrap_or(true);

        let expected = if locked {
            conditions.pubkeys.unwrap_or_default()
        } else {
            conditions.refund_keys.unwrap_or_default()
        };

        let signing_key = secret_key.public_key().x_only_public_key();
        if !expected
            .iter()
            .any(|k| k.x_only_public_key() == signing_key)
        {
            return Err(Error::SignatureNotRequired);
        }

        let msg: Vec<u8> = self.secret.to_bytes();
        let signature = secret_key.sign(&msg).map_err(super::nut11::Error::from)?;

        match self.witness.as_mut() {
            Some(witness) => witness.add_signatures(vec![signature.to_string()]),
            None => {
                self.witness = Some(Witness::HTLCWitness(HTLCWitness {
                    preimage: String::new(),
                    signatures: Some(vec![signature.to_string()]),
                }));
            }
        }

        Ok(())
    }
}
