//! NUT-13: Deterministic Secrets
//!
//! <https://github.com/cashubtc/nuts/blob/main/13.md>
//!
//! Per-output secrets and blinding factors are derived from the wallet seed
//! at `m/129372'/0'/keyset'/counter'/{0,1}` so a wallet can be restored from
//! its mnemonic alone.

use bitcoin::base64::engine::general_purpose;
use bitcoin::base64::Engine;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};

use super::nut00::{BlindedMessage, PreMint, PreMintSecrets};
use super::nut01::SecretKey;
use super::nut02::Id;
use crate::dhke::blind_message;
use crate::error::Error;
use crate::secret::Secret;
use crate::util::hex;
use crate::{Amount, SECP256K1};

impl Secret {
    /// Derive the secret for `keyset_id` at `counter`
    ///
    /// The leaf private key bytes hex encoded.
    pub fn from_xpriv(xpriv: Xpriv, keyset_id: Id, counter: u32) -> Result<Self, Error> {
        let path = derive_path_from_keyset_id(&keyset_id.to_string())?
            .child(ChildNumber::from_hardened_idx(counter)?)
            .child(ChildNumber::from_normal_idx(0)?);
        let derived_xpriv = xpriv.derive_priv(&SECP256K1, &path)?;

        Ok(Self::new(hex::encode(
            derived_xpriv.private_key.secret_bytes(),
        )))
    }
}

impl SecretKey {
    /// Derive the blinding factor for `keyset_id` at `counter`
    pub fn from_xpriv(xpriv: Xpriv, keyset_id: Id, counter: u32) -> Result<Self, Error> {
        let path = derive_path_from_keyset_id(&keyset_id.to_string())?
            .child(ChildNumber::from_hardened_idx(counter)?)
            .child(ChildNumber::from_normal_idx(1)?);
        let derived_xpriv = xpriv.derive_priv(&SECP256K1, &path)?;

        Ok(Self::from(derived_xpriv.private_key))
    }
}

impl PreMintSecrets {
    /// Generate blinded messages from predetermined secrets and blinding
    /// factors
    ///
    /// Consumes one counter index per part of the greedy split of `amount`,
    /// starting at `counter`.
    pub fn from_xpriv(
        keyset_id: Id,
        counter: u32,
        xpriv: Xpriv,
        amount: Amount,
    ) -> Result<Self, Error> {
        Self::from_xpriv_with_amounts(keyset_id, counter, xpriv, &amount.split())
    }

    /// Generate blinded messages for an explicit list of denominations
    pub fn from_xpriv_with_amounts(
        keyset_id: Id,
        counter: u32,
        xpriv: Xpriv,
        amounts: &[Amount],
    ) -> Result<Self, Error> {
        let mut pre_mint_secrets = PreMintSecrets::new(keyset_id);

        let mut counter = counter;

        for amount in amounts.iter().copied() {
            let secret = Secret::from_xpriv(xpriv, keyset_id, counter)?;
            let blinding_factor = SecretKey::from_xpriv(xpriv, keyset_id, counter)?;

            let (blinded, r) = blind_message(&secret.to_bytes(), Some(blinding_factor))?;

            let blinded_message = BlindedMessage::new(amount, keyset_id, blinded);

            let pre_mint = PreMint {
                blinded_message,
                secret: secret.clone(),
                r,
                amount,
            };

            pre_mint_secrets.secrets.push(pre_mint);
            counter += 1;
        }

        Ok(pre_mint_secrets)
    }

    /// Generate blinded messages for the restore flow
    ///
    /// Outputs carry zero amounts since the denominations are unknown until
    /// the mint returns the original signatures.
    pub fn restore_batch(
        keyset_id: Id,
        xpriv: Xpriv,
        start_count: u32,
        end_count: u32,
    ) -> Result<Self, Error> {
        let mut pre_mint_secrets = PreMintSecrets::new(keyset_id);

        for i in start_count..=end_count {
            let secret = Secret::from_xpriv(xpriv, keyset_id, i)?;
            let blinding_factor = SecretKey::from_xpriv(xpriv, keyset_id, i)?;

            let (blinded, r) = blind_message(&secret.to_bytes(), Some(blinding_factor))?;

            let blinded_message = BlindedMessage::new(Amount::ZERO, keyset_id, blinded);

            let pre_mint = PreMint {
                blinded_message,
                secret: secret.clone(),
                r,
                amount: Amount::ZERO,
            };

            pre_mint_secrets.secrets.push(pre_mint);
        }

        Ok(pre_mint_secrets)
    }
}

/// Derivation path for a keyset id
///
/// `m/129372'/0'/keyset'` where the keyset child is the id interpreted as a
/// big-endian integer, reduced mod 2^31 - 1. Hex ids are decoded as hex;
/// ids of retired base64 keysets are decoded from base64.
pub fn derive_path_from_keyset_id(keyset_id: &str) -> Result<DerivationPath, Error> {
    let keyset_child_number = ChildNumber::from_hardened_idx(keyset_id_index(keyset_id)?)?;
    Ok(DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(129372)?,
        ChildNumber::from_hardened_idx(0)?,
        keyset_child_number,
    ]))
}

fn keyset_id_index(keyset_id: &str) -> Result<u32, Error> {
    let bytes = match hex::decode(keyset_id) {
        Ok(bytes) => bytes,
        Err(_) => general_purpose::STANDARD_NO_PAD
            .decode(keyset_id)
            .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(keyset_id))
            .map_err(|_| Error::Custom(format!("Invalid keyset id: {keyset_id}")))?,
    };

    if bytes.len() > 16 {
        return Err(Error::Custom(format!("Invalid keyset id: {keyset_id}")));
    }

    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(&bytes);
    let int = u128::from_be_bytes(buf);

    Ok((int % ((1u128 << 31) - 1)) as u32)
}
