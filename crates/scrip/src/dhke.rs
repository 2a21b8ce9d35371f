//! Blind Diffie-Hellmann key exchange
//!
//! The wallet side of the issuance protocol: hash a secret to a curve point,
//! blind it with a random factor, and unblind the mint's signature.

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::Scalar;

use crate::error::Error;
use crate::nuts::nut01::{Keys, PublicKey, SecretKey};
use crate::nuts::nut12::ProofDleq;
use crate::nuts::{BlindSignature, Proof, Proofs};
use crate::secret::Secret;
use crate::util::hex;
use crate::SECP256K1;

const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

/// Deterministically map a message to a point on the curve
///
/// `h = SHA256(DOMAIN_SEPARATOR || message)`, then for an incrementing
/// little-endian u32 counter try to parse `0x02 || SHA256(h || counter)` as a
/// compressed point. Roughly half the candidates are valid, so the bounded
/// counter failing is computationally negligible.
pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, Error> {
    let msg_to_hash: Vec<u8> = [DOMAIN_SEPARATOR, message].concat();

    let msg_hash: [u8; 32] = Sha256Hash::hash(&msg_to_hash).to_byte_array();

    let mut counter: u32 = 0;
    while counter < 2_u32.pow(16) {
        let mut bytes_to_hash: Vec<u8> = Vec::with_capacity(36);
        bytes_to_hash.extend_from_slice(&msg_hash);
        bytes_to_hash.extend_from_slice(&counter.to_le_bytes());
        let hash: [u8; 32] = Sha256Hash::hash(&bytes_to_hash).to_byte_array();

        let mut candidate = [0x02u8; 33];
        candidate[1..].copy_from_slice(&hash);

        match PublicKey::from_slice(&candidate) {
            Ok(pubkey) => return Ok(pubkey),
            Err(_) => counter += 1,
        }
    }

    Err(Error::NoValidPoint)
}

/// Challenge hash for DLEQ proofs
///
/// SHA256 over the concatenated lowercase-hex uncompressed serializations of
/// the public keys, in the given order.
pub fn hash_e<I>(public_keys: I) -> [u8; 32]
where
    I: IntoIterator<Item = PublicKey>,
{
    let mut e: String = String::new();

    for public_key in public_keys.into_iter() {
        let uncompressed: [u8; 65] = public_key.to_uncompressed_bytes();
        e.push_str(&hex::encode(uncompressed));
    }

    Sha256Hash::hash(e.as_bytes()).to_byte_array()
}

/// Blind Message
///
/// `B_ = Y + rG`
pub fn blind_message(
    secret: &[u8],
    blinding_factor: Option<SecretKey>,
) -> Result<(PublicKey, SecretKey), Error> {
    let y: PublicKey = hash_to_curve(secret)?;
    let r: SecretKey = blinding_factor.unwrap_or_else(SecretKey::generate);
    Ok((y.combine(&r.public_key())?, r))
}

/// Unblind Message
///
/// `C = C_ - rA`
pub fn unblind_message(
    // C_
    blinded_key: &PublicKey,
    r: &SecretKey,
    // A
    mint_pubkey: &PublicKey,
) -> Result<PublicKey, Error> {
    let r: Scalar = r.as_scalar();

    // a = r * A
    let a: PublicKey = mint_pubkey.mul_tweak(&SECP256K1, &r)?.into();

    // C_ - a
    let a: PublicKey = a.negate(&SECP256K1).into();
    Ok(blinded_key.combine(&a)?)
}

/// Construct proofs from the mint's blind signatures
///
/// Unblinds each signature against the key for its amount. When the mint
/// attached a DLEQ proof it is verified here; a single failure aborts the
/// whole batch. The blinding factor is retained in the proof for later
/// re-verification.
pub fn construct_proofs(
    promises: Vec<BlindSignature>,
    rs: Vec<SecretKey>,
    secrets: Vec<Secret>,
    keys: &Keys,
) -> Result<Proofs, Error> {
    if promises.len() != rs.len() || promises.len() != secrets.len() {
        return Err(Error::Custom(
            "Promises, blinding factors and secrets must have the same length".to_string(),
        ));
    }

    let mut proofs = vec![];
    for ((blinded_signature, r), secret) in promises.into_iter().zip(rs).zip(secrets) {
        let blinded_c: PublicKey = blinded_signature.c;
        let a: PublicKey = keys
            .amount_key(blinded_signature.amount)
            .ok_or(Error::AmountKeyNotFound)?;

        if blinded_signature.dleq.is_some() {
            let blinded_message = hash_to_curve(secret.as_bytes())?.combine(&r.public_key())?;
            blinded_signature.verify_dleq(a, blinded_message)?;
        }

        let unblinded_signature: PublicKey = unblind_message(&blinded_c, &r, &a)?;

        let dleq = blinded_signature
            .dleq
            .map(|d| ProofDleq::new(d.e, d.s, r.clone()));

        let proof = Proof {
            amount: blinded_signature.amount,
            keyset_id: blinded_signature.keyset_id,
            secret,
            c: unblinded_signature,
            witness: None,
            dleq,
        };

        proofs.push(proof);
    }

    Ok(proofs)
}
