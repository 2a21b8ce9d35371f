//! Output construction and proof lifecycle
//!
//! Builds the blinded messages submitted to the mint and turns the returned
//! blind signatures into spendable proofs.

use std::sync::Arc;

use bitcoin::bip32::Xpriv;
use bitcoin::Network;
use scrip::dhke::construct_proofs;
use scrip::nuts::{BlindSignature, KeySet, Keys, PreMintSecrets, Proofs};
use scrip::Amount;

use crate::counter::{CounterSource, Range};
use crate::error::Error;

/// Builds output data for a keyset
///
/// With a seed attached, secrets and blinding factors are derived at
/// counter-reserved indexes; otherwise they are random. The reservation is
/// consumed when the outputs are built and never released, so a failed
/// operation burns its indexes.
#[derive(Debug, Clone)]
pub struct OutputBuilder {
    xpriv: Option<Xpriv>,
    counter: Option<Arc<dyn CounterSource>>,
}

impl OutputBuilder {
    /// Builder producing random secrets
    pub fn random() -> Self {
        Self {
            xpriv: None,
            counter: None,
        }
    }

    /// Builder producing deterministic secrets from a seed
    ///
    /// The seed is the BIP39 seed of the wallet mnemonic.
    pub fn deterministic(
        seed: &[u8],
        counter: Arc<dyn CounterSource>,
    ) -> Result<Self, Error> {
        let xpriv = Xpriv::new_master(Network::Bitcoin, seed).map_err(scrip::Error::from)?;

        Ok(Self {
            xpriv: Some(xpriv),
            counter: Some(counter),
        })
    }

    /// Whether outputs will be derived deterministically
    pub fn is_deterministic(&self) -> bool {
        self.xpriv.is_some()
    }

    /// Build output data for `amount` on `keyset`
    ///
    /// The amount is split greedily into the largest supported denominations
    /// unless an explicit `split` is given. Every part must be a denomination
    /// of the keyset.
    pub async fn build(
        &self,
        keyset: &KeySet,
        amount: Amount,
        split: Option<&[Amount]>,
    ) -> Result<PreMintSecrets, Error> {
        let amounts = match split {
            Some(split) => amount.split_with_target(split).map_err(scrip::Error::from)?,
            None => amount.split(),
        };

        for part in &amounts {
            if keyset.keys.amount_key(*part).is_none() {
                return Err(Error::Protocol(scrip::Error::AmountKeyNotFound));
            }
        }

        match (&self.xpriv, &self.counter) {
            (Some(xpriv), Some(counter)) => {
                let range: Range = counter
                    .reserve(keyset.id, amounts.len() as u32)
                    .await?;

                Ok(PreMintSecrets::from_xpriv_with_amounts(
                    keyset.id,
                    range.start,
                    *xpriv,
                    &amounts,
                )?)
            }
            _ => Ok(PreMintSecrets::random_with_amounts(keyset.id, &amounts)?),
        }
    }

    /// Build a restore batch over derivation indexes `[start, end]`
    pub fn restore_batch(
        &self,
        keyset_id: scrip::nuts::Id,
        start: u32,
        end: u32,
    ) -> Result<PreMintSecrets, Error> {
        let xpriv = self
            .xpriv
            .ok_or_else(|| Error::Custom("Restore requires a seed".to_string()))?;

        Ok(PreMintSecrets::restore_batch(keyset_id, xpriv, start, end)?)
    }
}

/// Complete output data into spendable proofs
///
/// Signatures must be on the same keyset as the outputs. DLEQ proofs the
/// mint attached are verified; one bad signature fails the whole batch.
pub fn into_proofs(
    premint: PreMintSecrets,
    signatures: Vec<BlindSignature>,
    keys: &Keys,
) -> Result<Proofs, Error> {
    if signatures.len() != premint.len() {
        return Err(Error::BadBatMintResponse(format!(
            "Expected {} signatures, got {}",
            premint.len(),
            signatures.len()
        )));
    }

    if let Some(signature) = signatures
        .iter()
        .find(|signature| signature.keyset_id != premint.keyset_id)
    {
        tracing::warn!(
            "Signature on keyset {} for outputs on {}",
            signature.keyset_id,
            premint.keyset_id
        );
        return Err(Error::KeyFetchMismatch);
    }

    Ok(construct_proofs(
        signatures,
        premint.rs(),
        premint.secrets(),
        keys,
    )?)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::str::FromStr;

    use bip39::Mnemonic;
    use scrip::nuts::{CurrencyUnit, Id, PublicKey, SecretKey};
    use scrip::SECP256K1;

    use super::*;
    use crate::counter::MemoryCounterSource;

    const MNEMONIC: &str =
        "half depart obvious quality work element tank gorilla view sugar picture humble";

    /// Keyset whose secret keys are known so signatures can be produced
    fn fake_keyset() -> (KeySet, BTreeMap<Amount, SecretKey>) {
        let mut secret_keys = BTreeMap::new();
        let mut keys = BTreeMap::new();

        for bit in 0..8u64 {
            let amount = Amount::from(1 << bit);
            let secret_key = SecretKey::generate();
            keys.insert(amount, secret_key.public_key());
            secret_keys.insert(amount, secret_key);
        }

        let keys = Keys::new(keys);
        let keyset = KeySet {
            id: Id::from_keys(&keys),
            unit: CurrencyUnit::Sat,
            final_expiry: None,
            keys,
        };

        (keyset, secret_keys)
    }

    fn sign_outputs(
        premint: &PreMintSecrets,
        secret_keys: &BTreeMap<Amount, SecretKey>,
    ) -> Vec<BlindSignature> {
        premint
            .iter()
            .map(|pm| {
                let key = secret_keys.get(&pm.amount).unwrap();
                let c: PublicKey = pm
                    .blinded_message
                    .blinded_secret
                    .mul_tweak(&SECP256K1, &key.as_scalar())
                    .unwrap()
                    .into();

                BlindSignature {
                    amount: pm.amount,
                    keyset_id: pm.blinded_message.keyset_id,
                    c,
                    dleq: None,
                }
            })
            .collect()
    }

    fn seed() -> [u8; 64] {
        Mnemonic::from_str(MNEMONIC).unwrap().to_seed("")
    }

    #[tokio::test]
    async fn test_deterministic_build_consumes_counter() {
        let (keyset, _) = fake_keyset();
        let counter = Arc::new(MemoryCounterSource::new());
        let builder = OutputBuilder::deterministic(&seed(), counter.clone()).unwrap();

        let premint = builder.build(&keyset, Amount::from(11), None).await.unwrap();
        assert_eq!(premint.len(), 3);

        let snapshot = counter.snapshot().await.unwrap();
        assert_eq!(snapshot.get(&keyset.id), Some(&3));

        // The next build continues at the next index and differs
        let second = builder.build(&keyset, Amount::from(11), None).await.unwrap();
        assert_ne!(premint.secrets(), second.secrets());
        assert_eq!(counter.snapshot().await.unwrap().get(&keyset.id), Some(&6));
    }

    #[tokio::test]
    async fn test_explicit_split() {
        let (keyset, _) = fake_keyset();
        let builder = OutputBuilder::random();

        let split = [Amount::from(2), Amount::from(1), Amount::from(1)];
        let premint = builder
            .build(&keyset, Amount::from(4), Some(&split))
            .await
            .unwrap();

        assert_eq!(premint.amounts(), split.to_vec());

        // Split must sum to the amount
        assert!(builder
            .build(&keyset, Amount::from(5), Some(&split))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unsupported_denomination() {
        let (keyset, _) = fake_keyset();
        let builder = OutputBuilder::random();

        // 512 is not in the keyset
        assert!(builder.build(&keyset, Amount::from(512), None).await.is_err());
    }

    #[tokio::test]
    async fn test_into_proofs_round_trip() {
        let (keyset, secret_keys) = fake_keyset();
        let counter = Arc::new(MemoryCounterSource::new());
        let builder = OutputBuilder::deterministic(&seed(), counter).unwrap();

        let premint = builder.build(&keyset, Amount::from(5), None).await.unwrap();
        let signatures = sign_outputs(&premint, &secret_keys);

        let secrets = premint.secrets();
        let proofs = into_proofs(premint, signatures, &keyset.keys).unwrap();

        assert_eq!(proofs.len(), 2);
        for (proof, secret) in proofs.iter().zip(secrets) {
            assert_eq!(proof.secret, secret);
            // C = a*hash_to_curve(secret)
            let expected: PublicKey = scrip::dhke::hash_to_curve(secret.as_bytes())
                .unwrap()
                .mul_tweak(
                    &SECP256K1,
                    &secret_keys.get(&proof.amount).unwrap().as_scalar(),
                )
                .unwrap()
                .into();
            assert_eq!(proof.c, expected);
        }
    }

    #[tokio::test]
    async fn test_into_proofs_count_mismatch() {
        let (keyset, secret_keys) = fake_keyset();
        let builder = OutputBuilder::random();

        let premint = builder.build(&keyset, Amount::from(3), None).await.unwrap();
        let mut signatures = sign_outputs(&premint, &secret_keys);
        signatures.pop();

        assert!(into_proofs(premint, signatures, &keyset.keys).is_err());
    }
}
