//! NUT-12: Offline ecash signature validation
//!
//! <https://github.com/cashubtc/nuts/blob/main/12.md>

use bitcoin::secp256k1::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{BlindSignature, Proof};
use super::nut01::{PublicKey, SecretKey};
use crate::dhke::{hash_e, hash_to_curve};
use crate::SECP256K1;

/// NUT12 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Missing DLEQ Proof
    #[error("No DLEQ proof provided")]
    MissingDleqProof,
    /// Invalid DLEQ Proof
    #[error("Invalid DLEQ proof")]
    InvalidDleqProof,
    /// DHKE error
    #[error("Could not hash to curve")]
    HashToCurve,
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] super::nut01::Error),
    /// SECP256k1 Error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
}

/// DLEQ on a blind signature
///
/// Defined in [NUT12](https://github.com/cashubtc/nuts/blob/main/12.md)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignatureDleq {
    /// e
    pub e: SecretKey,
    /// s
    pub s: SecretKey,
}

/// DLEQ on a proof
///
/// Retains the blinding factor so the proof can be re-verified against the
/// mint key without the original blinded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofDleq {
    /// e
    pub e: SecretKey,
    /// s
    pub s: SecretKey,
    /// Blinding factor
    pub r: SecretKey,
}

impl ProofDleq {
    /// Create new [`ProofDleq`]
    pub fn new(e: SecretKey, s: SecretKey, r: SecretKey) -> Self {
        Self { e, s, r }
    }
}

/// Verify DLEQ
///
/// ```text
/// R1 = s*G - e*A
/// R2 = s*B' - e*C'
/// e == hash(R1, R2, A, C')
/// ```
fn verify_dleq(
    blinded_message: PublicKey,   // B'
    blinded_signature: PublicKey, // C'
    e: &SecretKey,
    s: &SecretKey,
    mint_pubkey: PublicKey, // A
) -> Result<(), Error> {
    let e_bytes: [u8; 32] = e.to_secret_bytes();
    let e: Scalar = e.as_scalar();

    // a = e*A
    let a: PublicKey = mint_pubkey.mul_tweak(&SECP256K1, &e)?.into();

    // R1 = s*G - a
    let a: PublicKey = a.negate(&SECP256K1).into();
    let r1: PublicKey = s.public_key().combine(&a)?; // s*G + (-a)

    // b = s*B'
    let s: Scalar = s.as_scalar();
    let b: PublicKey = blinded_message.mul_tweak(&SECP256K1, &s)?.into();

    // c = e*C'
    let c: PublicKey = blinded_signature.mul_tweak(&SECP256K1, &e)?.into();

    // R2 = b - c
    let c: PublicKey = c.negate(&SECP256K1).into();
    let r2: PublicKey = b.combine(&c)?;

    // hash(R1, R2, A, C')
    let hash_e: [u8; 32] = hash_e([r1, r2, mint_pubkey, blinded_signature]);

    if e_bytes != hash_e {
        tracing::warn!("DLEQ on signature failed");
        tracing::debug!("e_bytes: {:?}, hash_e: {:?}", e_bytes, hash_e);
        return Err(Error::InvalidDleqProof);
    }

    Ok(())
}

impl Proof {
    /// Verify proof DLEQ
    ///
    /// Reblind variant: `B'` and `C'` are recomputed from the secret, the
    /// retained blinding factor and the unblinded signature.
    pub fn verify_dleq(&self, mint_pubkey: PublicKey) -> Result<(), Error> {
        match &self.dleq {
            Some(dleq) => {
                let y = hash_to_curve(self.secret.as_bytes()).map_err(|_| Error::HashToCurve)?;

                // C' = C + r*A
                let r: Scalar = dleq.r.as_scalar();
                let bs1: PublicKey = mint_pubkey.mul_tweak(&SECP256K1, &r)?.into();
                let blinded_signature: PublicKey = self.c.combine(&bs1)?;

                // B' = Y + r*G
                let blinded_message: PublicKey = y.combine(&dleq.r.public_key())?;

                verify_dleq(
                    blinded_message,
                    blinded_signature,
                    &dleq.e,
                    &dleq.s,
                    mint_pubkey,
                )
            }
            None => Err(Error::MissingDleqProof),
        }
    }
}

impl BlindSignature {
    /// Verify DLEQ on [BlindSignature]
    #[inline]
    pub fn verify_dleq(
        &self,
        mint_pubkey: PublicKey,
        blinded_message: PublicKey,
    ) -> Result<(), Error> {
        match &self.dleq {
            Some(dleq) => verify_dleq(blinded_message, self.c, &dleq.e, &dleq.s, mint_pubkey),
            None => Err(Error::MissingDleqProof),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::secret::Secret;

    /// Mint side DLEQ construction, used to exercise the verifier
    ///
    /// ```text
    /// r = random nonce
    /// R1 = r*G
    /// R2 = r*B'
    /// e = hash(R1, R2, A, C')
    /// s = r + e*a
    /// ```
    fn calculate_dleq(
        blinded_signature: PublicKey, // C'
        blinded_message: &PublicKey,  // B'
        mint_secret_key: &SecretKey,  // a
    ) -> BlindSignatureDleq {
        let r: SecretKey = SecretKey::generate();

        let r1 = r.public_key();

        let r_scal: Scalar = r.as_scalar();
        let r2: PublicKey = blinded_message
            .mul_tweak(&SECP256K1, &r_scal)
            .unwrap()
            .into();

        let e: [u8; 32] = hash_e([r1, r2, mint_secret_key.public_key(), blinded_signature]);
        let e_sk: SecretKey = SecretKey::from_slice(&e).unwrap();

        // s = r + e*a
        let ea = e_sk
            .mul_tweak(&mint_secret_key.as_scalar())
            .unwrap();
        let s: SecretKey = r.add_tweak(&Scalar::from(ea)).unwrap().into();

        BlindSignatureDleq { e: e_sk, s }
    }

    #[test]
    fn test_blind_signature_dleq() {
        let blinded_sig = r#"{"amount":8,"id":"00882760bfa2eb41","C_":"02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2","dleq":{"e":"9818e061ee51d5c8edc3342369a554998ff7b4381c8652d724cdf46429be73d9","s":"9818e061ee51d5c8edc3342369a554998ff7b4381c8652d724cdf46429be73da"}}"#;

        let blinded: BlindSignature = serde_json::from_str(blinded_sig).unwrap();

        let secret_key =
            SecretKey::from_hex("0000000000000000000000000000000000000000000000000000000000000001")
                .unwrap();

        let mint_key = secret_key.public_key();

        let blinded_secret = PublicKey::from_str(
            "02a9acc1e48c25eeeb9289b5031cc57da9fe72f3fe2861d264bdc074209b107ba2",
        )
        .unwrap();

        blinded.verify_dleq(mint_key, blinded_secret).unwrap()
    }

    #[test]
    fn test_proof_dleq() {
        let proof = r#"{"amount": 1,"id": "00882760bfa2eb41","secret": "daf4dd00a2b68a0858a80450f52c8a7d2ccf87d375e43e216e0c571f089f63e9","C": "024369d2d22a80ecf78f3937da9d5f30c1b9f74f0c32684d583cca0fa6a61cdcfc","dleq": {"e": "b31e58ac6527f34975ffab13e70a48b6d2b0d35abc4b03f0151f09ee1a9763d4","s": "8fbae004c59e754d71df67e392b6ae4e29293113ddc2ec86592a0431d16306d8","r": "a6d13fcd7a18442e6076f5e1e7c887ad5de40a019824bdfa9fe740d302e8d861"}}"#;

        let proof: Proof = serde_json::from_str(proof).unwrap();

        // A
        let a: PublicKey = PublicKey::from_str(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();

        assert!(proof.verify_dleq(a).is_ok());
    }

    #[test]
    fn test_dleq_corruption_fails() {
        let proof = r#"{"amount": 1,"id": "00882760bfa2eb41","secret": "daf4dd00a2b68a0858a80450f52c8a7d2ccf87d375e43e216e0c571f089f63e9","C": "024369d2d22a80ecf78f3937da9d5f30c1b9f74f0c32684d583cca0fa6a61cdcfc","dleq": {"e": "b31e58ac6527f34975ffab13e70a48b6d2b0d35abc4b03f0151f09ee1a9763d4","s": "8fbae004c59e754d71df67e392b6ae4e29293113ddc2ec86592a0431d16306d8","r": "a6d13fcd7a18442e6076f5e1e7c887ad5de40a019824bdfa9fe740d302e8d861"}}"#;
        let proof: Proof = serde_json::from_str(proof).unwrap();

        let a: PublicKey = PublicKey::from_str(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();

        // Corrupt e
        let mut corrupted = proof.clone();
        corrupted.dleq.as_mut().unwrap().e =
            SecretKey::from_hex("b31e58ac6527f34975ffab13e70a48b6d2b0d35abc4b03f0151f09ee1a9763d5")
                .unwrap();
        assert!(corrupted.verify_dleq(a).is_err());

        // Corrupt s
        let mut corrupted = proof.clone();
        corrupted.dleq.as_mut().unwrap().s =
            SecretKey::from_hex("8fbae004c59e754d71df67e392b6ae4e29293113ddc2ec86592a0431d16306d9")
                .unwrap();
        assert!(corrupted.verify_dleq(a).is_err());

        // Corrupt r
        let mut corrupted = proof.clone();
        corrupted.dleq.as_mut().unwrap().r =
            SecretKey::from_hex("a6d13fcd7a18442e6076f5e1e7c887ad5de40a019824bdfa9fe740d302e8d862")
                .unwrap();
        assert!(corrupted.verify_dleq(a).is_err());

        // Corrupt C
        let mut corrupted = proof;
        corrupted.c = PublicKey::from_str(
            "02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904",
        )
        .unwrap();
        assert!(corrupted.verify_dleq(a).is_err());
    }

    #[test]
    fn test_dleq_round_trip() {
        use crate::dhke::{blind_message, unblind_message};

        // a
        let mint_secret = SecretKey::generate();
        let mint_pubkey = mint_secret.public_key();

        let secret = Secret::generate();
        let (blinded_message, r) = blind_message(secret.as_bytes(), None).unwrap();

        // C' = a*B'
        let blinded_signature: PublicKey = blinded_message
            .mul_tweak(&SECP256K1, &mint_secret.as_scalar())
            .unwrap()
            .into();

        let dleq = calculate_dleq(blinded_signature, &blinded_message, &mint_secret);

        let blind_sig = BlindSignature {
            amount: crate::Amount::from(1),
            keyset_id: crate::nuts::Id::from_str("009a1f293253e41e").unwrap(),
            c: blinded_signature,
            dleq: Some(dleq.clone()),
        };

        // Verifies against the blinded message
        assert!(blind_sig.verify_dleq(mint_pubkey, blinded_message).is_ok());

        // And after unblinding via the reblind variant
        let c = unblind_message(&blinded_signature, &r, &mint_pubkey).unwrap();
        let proof = Proof {
            amount: crate::Amount::from(1),
            keyset_id: crate::nuts::Id::from_str("009a1f293253e41e").unwrap(),
            secret,
            c,
            witness: None,
            dleq: Some(ProofDleq::new(dleq.e, dleq.s, r)),
        };

        assert!(proof.verify_dleq(mint_pubkey).is_ok());
    }
}
