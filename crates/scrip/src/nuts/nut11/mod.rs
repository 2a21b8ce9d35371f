//! NUT-11: Pay to Public Key (P2PK)
//!
//! <https://github.com/cashubtc/nuts/blob/main/11.md>

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::XOnlyPublicKey;
use serde::de::Error as DeserializerError;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::nut00::{BlindedMessage, Proof, Witness};
use super::nut01::PublicKey;
use super::nut10::{Kind, Secret as Nut10Secret};
use super::SecretKey;
use crate::secret::Secret;
use crate::util::{hex, unix_time};

pub mod serde_p2pk_witness;

/// Nut11 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Incorrect secret kind
    #[error("Secret is not a p2pk secret")]
    IncorrectSecretKind,
    /// Incorrect witness kind
    #[error("Witness is not a p2pk witness")]
    IncorrectWitnessKind,
    /// P2PK locktime has already passed
    #[error("Locktime in past")]
    LocktimeInPast,
    /// Witness signature is not valid
    #[error("Invalid signature")]
    InvalidSignature,
    /// Signing key is not a required witness
    #[error("Signature from key is not required")]
    SignatureNotRequired,
    /// A valid signature from this key is already present
    #[error("Proof already signed by key")]
    AlreadySigned,
    /// Unknown tag in P2PK secret
    #[error("Unknown tag in P2PK secret")]
    UnknownTag,
    /// Unknown Sigflag
    #[error("Unknown sigflag")]
    UnknownSigFlag,
    /// P2PK Spend conditions not met
    #[error("P2PK spend conditions are not met")]
    SpendConditionsNotMet,
    /// Tag missing expected value
    #[error("Tag value not found")]
    TagValueNotFound,
    /// Witness Signatures not provided
    #[error("Witness signatures not provided")]
    SignaturesNotProvided,
    /// Parse int error
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    /// From hex error
    #[error(transparent)]
    HexError(#[from] hex::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] super::nut01::Error),
    /// NUT10 Error
    #[error(transparent)]
    NUT10(#[from] super::nut10::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
}

/// P2PK Witness
#[derive(Default, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P2PKWitness {
    /// Signatures
    pub signatures: Vec<String>,
}

impl P2PKWitness {
    /// Check if Witness is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl Proof {
    /// Sign [Proof]
    ///
    /// The message is the proof's secret string. Fails if the key is not
    /// among the currently expected witnesses or a valid signature from the
    /// same key is already attached.
    pub fn sign_p2pk(&mut self, secret_key: SecretKey) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret).try_into()?;
        if secret.kind != Kind::P2PK {
            return Err(Error::IncorrectSecretKind);
        }

        let spending_conditions: Conditions = secret
            .secret_data
            .tags
            .clone()
            .unwrap_or_default()
            .try_into()?;

        let expected: Vec<PublicKey> =
            expected_signing_keys(&secret, &spending_conditions, unix_time())?;

        let signing_key = secret_key.public_key().x_only_public_key();
        if !expected
            .iter()
            .any(|k| k.x_only_public_key() == signing_key)
        {
            return Err(Error::SignatureNotRequired);
        }

        let msg: Vec<u8> = self.secret.to_bytes();

        // A second valid signature from the same key adds nothing
        if let Some(witness) = self.witness.as_ref() {
            let existing: Vec<Signature> = witness
                .signatures()
                .unwrap_or_default()
                .iter()
                .flat_map(|s| Signature::from_str(s))
                .collect();

            let pubkey = secret_key.public_key();
            if existing.iter().any(|sig| pubkey.verify(&msg, sig).is_ok()) {
                return Err(Error::AlreadySigned);
            }
        }

        let signature: Signature = secret_key.sign(&msg)?;

        let signatures = vec![signature.to_string()];

        match self.witness.as_mut() {
            Some(witness) => {
                witness.add_signatures(signatures);
            }
            None => {
                let mut p2pk_witness = Witness::P2PKWitness(P2PKWitness::default());
                p2pk_witness.add_signatures(signatures);
                self.witness = Some(p2pk_witness);
            }
        };

        Ok(())
    }

    /// Sign an aggregate message (SIG_ALL)
    ///
    /// Under `SIG_ALL` the signature covers a canonicalization of the whole
    /// transaction supplied by the caller instead of the single secret. The
    /// same witness rules apply: the key must be expected and may only sign
    /// once.
    pub fn sign_p2pk_with_message(
        &mut self,
        secret_key: SecretKey,
        message: &[u8],
    ) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret).try_into()?;
        if secret.kind != Kind::P2PK {
            return Err(Error::IncorrectSecretKind);
        }

        let spending_conditions: Conditions = secret
            .secret_data
            .tags
            .clone()
            .unwrap_or_default()
            .try_into()?;

        let expected: Vec<PublicKey> =
            expected_signing_keys(&secret, &spending_conditions, unix_time())?;

        let signing_key = secret_key.public_key().x_only_public_key();
        if !expected
            .iter()
            .any(|k| k.x_only_public_key() == signing_key)
        {
            return Err(Error::SignatureNotRequired);
        }

        if let Some(witness) = self.witness.as_ref() {
            let existing: Vec<Signature> = witness
                .signatures()
                .unwrap_or_default()
                .iter()
                .flat_map(|s| Signature::from_str(s))
                .collect();

            let pubkey = secret_key.public_key();
            if existing
                .iter()
                .any(|sig| pubkey.verify(message, sig).is_ok())
            {
                return Err(Error::AlreadySigned);
            }
        }

        let signature: Signature = secret_key.sign(message)?;

        let signatures = vec![signature.to_string()];

        match self.witness.as_mut() {
            Some(witness) => {
                witness.add_signatures(signatures);
            }
            None => {
                let mut p2pk_witness = Witness::P2PKWitness(P2PKWitness::default());
                p2pk_witness.add_signatures(signatures);
                self.witness = Some(p2pk_witness);
            }
        };

        Ok(())
    }

    /// Verify P2PK signatures on [Proof]
    ///
    /// Counts the distinct expected-witness keys for which at least one
    /// witness signature verifies and compares against the number of
    /// required signatures.
    pub fn verify_p2pk(&self) -> Result<(), Error> {
        let secret: Nut10Secret = (&self.secret).try_into()?;
        if secret.kind != Kind::P2PK {
            return Err(Error::IncorrectSecretKind);
        }

        let spending_conditions: Conditions = secret
            .secret_data
            .tags
            .clone()
            .unwrap_or_default()
            .try_into()?;

        let now = unix_time();
        let expected = expected_signing_keys(&secret, &spending_conditions, now)?;

        // An expired locktime with no refund keys is spendable by anyone
        if expected.is_empty() {
            return Ok(());
        }

        let witness_signatures = match &self.witness {
            Some(witness) => witness.signatures(),
            None => None,
        };

        let witness_signatures = witness_signatures.ok_or(Error::SignaturesNotProvided)?;

        let msg: &[u8] = self.secret.as_bytes();

        let signatures: Vec<Signature> = witness_signatures
            .iter()
            .flat_map(|s| Signature::from_str(s))
            .collect();

        let required = required_sigs(&spending_conditions, now);

        if valid_signatures(msg, &expected, &signatures) >= required {
            Ok(())
        } else {
            Err(Error::SpendConditionsNotMet)
        }
    }
}

/// Witness keys expected at time `now`
///
/// Before the locktime the data key plus the `pubkeys` tag must sign. At or
/// after the locktime only the refund keys can spend; with no refund keys
/// the proof becomes unconditional (empty result).
pub(crate) fn expected_signing_keys(
    secret: &Nut10Secret,
    conditions: &Conditions,
    now: u64,
) -> Result<Vec<PublicKey>, Error> {
    let locked = conditions.locktime.map(|l| l > now).unwrap_or(true);

    if locked {
        let mut pubkeys = conditions.pubkeys.clone().unwrap_or_default();
        if secret.kind == Kind::P2PK {
            pubkeys.insert(0, PublicKey::from_str(&secret.secret_data.data)?);
        }
        Ok(pubkeys)
    } else {
        Ok(conditions.refund_keys.clone().unwrap_or_default())
    }
}

/// Number of signatures required at time `now`
pub(crate) fn required_sigs(conditions: &Conditions, now: u64) -> u64 {
    let locked = conditions.locktime.map(|l| l > now).unwrap_or(true);

    if locked {
        conditions.num_sigs.unwrap_or(1)
    } else {
        conditions.num_sigs_refund.unwrap_or(1)
    }
}

/// Count of distinct pubkeys with at least one valid signature
///
/// Key identity is x-only; `02`/`03` variants of the same x coordinate are
/// one signer. Malformed signatures simply do not count.
pub fn valid_signatures(msg: &[u8], pubkeys: &[PublicKey], signatures: &[Signature]) -> u64 {
    let mut signed: HashSet<XOnlyPublicKey> = HashSet::new();

    for pubkey in pubkeys {
        if signatures
            .iter()
            .any(|signature| pubkey.verify(msg, signature).is_ok())
        {
            signed.insert(pubkey.x_only_public_key());
        }
    }

    signed.len() as u64
}

impl BlindedMessage {
    /// Sign [BlindedMessage]
    ///
    /// Output signature for SIG_ALL transactions. The message is the
    /// compressed hex encoding of `B_`.
    pub fn sign_p2pk(&mut self, secret_key: SecretKey) -> Result<(), Error> {
        let msg: String = self.blinded_secret.to_hex();
        let signature: Signature = secret_key.sign(msg.as_bytes())?;

        let signatures = vec![signature.to_string()];

        match self.witness.as_mut() {
            Some(witness) => {
                witness.add_signatures(signatures);
            }
            None => {
                let mut p2pk_witness = Witness::P2PKWitness(P2PKWitness::default());
                p2pk_witness.add_signatures(signatures);
                self.witness = Some(p2pk_witness);
            }
        };

        Ok(())
    }

    /// Verify P2PK signatures on [BlindedMessage]
    pub fn verify_p2pk(&self, pubkeys: &[PublicKey], required_sigs: u64) -> Result<(), Error> {
        let msg = self.blinded_secret.to_hex();

        let signatures: Vec<Signature> = self
            .witness
            .as_ref()
            .and_then(|witness| witness.signatures())
            .ok_or(Error::SignaturesNotProvided)?
            .iter()
            .flat_map(|s| Signature::from_str(s))
            .collect();

        if valid_signatures(msg.as_bytes(), pubkeys, &signatures) >= required_sigs {
            Ok(())
        } else {
            Err(Error::SpendConditionsNotMet)
        }
    }
}

/// Spending conditions
///
/// Defined in [NUT10](https://github.com/cashubtc/nuts/blob/main/10.md)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpendingConditions {
    /// NUT11 Spending conditions
    ///
    /// Defined in [NUT11](https://github.com/cashubtc/nuts/blob/main/11.md)
    P2PKConditions {
        /// The public key of the recipient of the locked ecash
        data: PublicKey,
        /// Additional Optional Spending [`Conditions`]
        conditions: Option<Conditions>,
    },
    /// NUT14 Spending conditions
    ///
    /// Defined in [NUT14](https://github.com/cashubtc/nuts/blob/main/14.md)
    HTLCConditions {
        /// Hash lock of ecash
        data: Sha256Hash,
        /// Additional Optional Spending [`Conditions`]
        conditions: Option<Conditions>,
    },
}

impl SpendingConditions {
    /// New HTLC [SpendingConditions]
    ///
    /// The lock is the SHA256 hash of the hex-encoded preimage.
    pub fn new_htlc(preimage: String, conditions: Option<Conditions>) -> Result<Self, Error> {
        let htlc = Sha256Hash::hash(&hex::decode(preimage)?);

        Ok(Self::HTLCConditions {
            data: htlc,
            conditions,
        })
    }

    /// New P2PK [SpendingConditions]
    pub fn new_p2pk(pubkey: PublicKey, conditions: Option<Conditions>) -> Self {
        Self::P2PKConditions {
            data: pubkey,
            conditions,
        }
    }

    /// Kind of [SpendingConditions]
    pub fn kind(&self) -> Kind {
        match self {
            Self::P2PKConditions { .. } => Kind::P2PK,
            Self::HTLCConditions { .. } => Kind::HTLC,
        }
    }

    /// Number of signatures required to unlock
    pub fn num_sigs(&self) -> Option<u64> {
        match self {
            Self::P2PKConditions { conditions, .. } | Self::HTLCConditions { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.num_sigs)
            }
        }
    }

    /// Public keys of locked [`Proof`]
    pub fn pubkeys(&self) -> Option<Vec<PublicKey>> {
        match self {
            Self::P2PKConditions { data, conditions } => {
                let mut pubkeys = vec![*data];
                if let Some(conditions) = conditions {
                    pubkeys.extend(conditions.pubkeys.clone().unwrap_or_default());
                }

                Some(pubkeys)
            }
            Self::HTLCConditions { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.pubkeys.clone())
            }
        }
    }

    /// Locktime of Spending Conditions
    pub fn locktime(&self) -> Option<u64> {
        match self {
            Self::P2PKConditions { conditions, .. } | Self::HTLCConditions { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.locktime)
            }
        }
    }

    /// Refund keys
    pub fn refund_keys(&self) -> Option<Vec<PublicKey>> {
        match self {
            Self::P2PKConditions { conditions, .. } | Self::HTLCConditions { conditions, .. } => {
                conditions.as_ref().and_then(|c| c.refund_keys.clone())
            }
        }
    }
}

impl TryFrom<&Secret> for SpendingConditions {
    type Error = Error;
    fn try_from(secret: &Secret) -> Result<SpendingConditions, Error> {
        let nut10_secret: Nut10Secret = secret.try_into()?;

        nut10_secret.try_into()
    }
}

impl TryFrom<Nut10Secret> for SpendingConditions {
    type Error = Error;
    fn try_from(secret: Nut10Secret) -> Result<SpendingConditions, Error> {
        match secret.kind {
            Kind::P2PK => Ok(SpendingConditions::P2PKConditions {
                data: PublicKey::from_str(&secret.secret_data.data)?,
                conditions: secret.secret_data.tags.and_then(|t| t.try_into().ok()),
            }),
            Kind::HTLC => Ok(Self::HTLCConditions {
                data: Sha256Hash::from_str(&secret.secret_data.data)
                    .map_err(|_| Error::TagValueNotFound)?,
                conditions: secret.secret_data.tags.and_then(|t| t.try_into().ok()),
            }),
        }
    }
}

impl From<SpendingConditions> for Nut10Secret {
    fn from(conditions: SpendingConditions) -> Nut10Secret {
        match conditions {
            SpendingConditions::P2PKConditions { data, conditions } => {
                Nut10Secret::new(Kind::P2PK, data.to_hex(), conditions)
            }
            SpendingConditions::HTLCConditions { data, conditions } => {
                Nut10Secret::new(Kind::HTLC, data.to_string(), conditions)
            }
        }
    }
}

/// P2PK and HTLC spending condition tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Unix locktime after which refund keys can be used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u64>,
    /// Additional Public keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkeys: Option<Vec<PublicKey>>,
    /// Refund keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_keys: Option<Vec<PublicKey>>,
    /// Number of signatures required
    ///
    /// Default is 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sigs: Option<u64>,
    /// Signature flag
    ///
    /// Default [`SigFlag::SigInputs`]
    pub sig_flag: SigFlag,
    /// Number of refund signatures required after the locktime
    ///
    /// Default is 1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_sigs_refund: Option<u64>,
}

impl Conditions {
    /// Create new Spending [`Conditions`]
    pub fn new(
        locktime: Option<u64>,
        pubkeys: Option<Vec<PublicKey>>,
        refund_keys: Option<Vec<PublicKey>>,
        num_sigs: Option<u64>,
        sig_flag: Option<SigFlag>,
        num_sigs_refund: Option<u64>,
    ) -> Result<Self, Error> {
        if let Some(locktime) = locktime {
            if locktime < unix_time() {
                return Err(Error::LocktimeInPast);
            }
        }

        Ok(Self {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag: sig_flag.unwrap_or_default(),
            num_sigs_refund,
        })
    }
}

impl From<Conditions> for Vec<Vec<String>> {
    fn from(conditions: Conditions) -> Vec<Vec<String>> {
        let Conditions {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag,
            num_sigs_refund,
        } = conditions;

        let mut tags = Vec::new();

        if let Some(pubkeys) = pubkeys {
            tags.push(Tag::PubKeys(pubkeys.into_iter().collect()).as_vec());
        }

        if let Some(locktime) = locktime {
            tags.push(Tag::LockTime(locktime).as_vec());
        }

        if let Some(num_sigs) = num_sigs {
            tags.push(Tag::NSigs(num_sigs).as_vec());
        }

        if let Some(refund_keys) = refund_keys {
            tags.push(Tag::Refund(refund_keys).as_vec())
        }

        if let Some(num_sigs_refund) = num_sigs_refund {
            tags.push(Tag::NSigsRefund(num_sigs_refund).as_vec())
        }

        tags.push(Tag::SigFlag(sig_flag).as_vec());

        tags
    }
}

impl TryFrom<Vec<Vec<String>>> for Conditions {
    type Error = Error;
    fn try_from(tags: Vec<Vec<String>>) -> Result<Conditions, Self::Error> {
        // Unrecognized or malformed tags are ignored
        let tags: HashMap<TagKind, Tag> = tags
            .into_iter()
            .flat_map(Tag::try_from)
            .map(|t| (t.kind(), t))
            .collect();

        let pubkeys = match tags.get(&TagKind::Pubkeys) {
            Some(Tag::PubKeys(pubkeys)) => Some(pubkeys.clone()),
            _ => None,
        };

        let locktime = match tags.get(&TagKind::Locktime) {
            Some(Tag::LockTime(locktime)) => Some(*locktime),
            _ => None,
        };

        let refund_keys = match tags.get(&TagKind::Refund) {
            Some(Tag::Refund(keys)) => Some(keys.clone()),
            _ => None,
        };

        let sig_flag = match tags.get(&TagKind::SigFlag) {
            Some(Tag::SigFlag(sigflag)) => *sigflag,
            _ => SigFlag::default(),
        };

        let num_sigs = match tags.get(&TagKind::NSigs) {
            Some(Tag::NSigs(num_sigs)) => Some(*num_sigs),
            _ => None,
        };

        let num_sigs_refund = match tags.get(&TagKind::NSigsRefund) {
            Some(Tag::NSigsRefund(num_sigs)) => Some(*num_sigs),
            _ => None,
        };

        Ok(Conditions {
            locktime,
            pubkeys,
            refund_keys,
            num_sigs,
            sig_flag,
            num_sigs_refund,
        })
    }
}

/// P2PK and HTLC Spending condition tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    /// Signature flag
    SigFlag,
    /// Number signatures required
    #[serde(rename = "n_sigs")]
    NSigs,
    /// Number refund signatures required
    #[serde(rename = "n_sigs_refund")]
    NSigsRefund,
    /// Locktime
    Locktime,
    /// Refund
    Refund,
    /// Pubkey
    Pubkeys,
    /// Custom tag kind
    Custom(String),
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigFlag => write!(f, "sigflag"),
            Self::NSigs => write!(f, "n_sigs"),
            Self::NSigsRefund => write!(f, "n_sigs_refund"),
            Self::Locktime => write!(f, "locktime"),
            Self::Refund => write!(f, "refund"),
            Self::Pubkeys => write!(f, "pubkeys"),
            Self::Custom(kind) => write!(f, "{kind}"),
        }
    }
}

impl<S> From<S> for TagKind
where
    S: AsRef<str>,
{
    fn from(tag: S) -> Self {
        match tag.as_ref() {
            "sigflag" => Self::SigFlag,
            "n_sigs" => Self::NSigs,
            "n_sigs_refund" => Self::NSigsRefund,
            "locktime" => Self::Locktime,
            "refund" => Self::Refund,
            "pubkeys" => Self::Pubkeys,
            t => Self::Custom(t.to_owned()),
        }
    }
}

/// Signature flag
///
/// Defined in [NUT11](https://github.com/cashubtc/nuts/blob/main/11.md)
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord, Hash,
)]
pub enum SigFlag {
    #[default]
    /// Requires valid signatures on all inputs.
    /// It is the default signature flag and will be applied even if the
    /// `sigflag` tag is absent.
    SigInputs,
    /// Requires valid signatures on all inputs and on all outputs.
    SigAll,
}

impl fmt::Display for SigFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SigAll => write!(f, "SIG_ALL"),
            Self::SigInputs => write!(f, "SIG_INPUTS"),
        }
    }
}

impl FromStr for SigFlag {
    type Err = Error;
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "SIG_ALL" => Ok(Self::SigAll),
            "SIG_INPUTS" => Ok(Self::SigInputs),
            _ => Err(Error::UnknownSigFlag),
        }
    }
}

/// Tag
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Tag {
    /// Sigflag [`Tag`]
    SigFlag(SigFlag),
    /// Number of Sigs [`Tag`]
    NSigs(u64),
    /// Number of refund Sigs [`Tag`]
    NSigsRefund(u64),
    /// Locktime [`Tag`]
    LockTime(u64),
    /// Refund [`Tag`]
    Refund(Vec<PublicKey>),
    /// Pubkeys [`Tag`]
    PubKeys(Vec<PublicKey>),
}

impl Tag {
    /// Get [`Tag`] Kind
    pub fn kind(&self) -> TagKind {
        match self {
            Self::SigFlag(_) => TagKind::SigFlag,
            Self::NSigs(_) => TagKind::NSigs,
            Self::NSigsRefund(_) => TagKind::NSigsRefund,
            Self::LockTime(_) => TagKind::Locktime,
            Self::Refund(_) => TagKind::Refund,
            Self::PubKeys(_) => TagKind::Pubkeys,
        }
    }

    /// Get [`Tag`] as string vector
    pub fn as_vec(&self) -> Vec<String> {
        self.clone().into()
    }
}

impl<S> TryFrom<Vec<S>> for Tag
where
    S: AsRef<str>,
{
    type Error = Error;

    fn try_from(tag: Vec<S>) -> Result<Self, Self::Error> {
        let tag_kind: TagKind = match tag.first() {
            Some(kind) => TagKind::from(kind),
            None => return Err(Error::UnknownTag),
        };

        let value = |index: usize| -> Result<&S, Error> {
            tag.get(index).ok_or(Error::TagValueNotFound)
        };

        match tag_kind {
            TagKind::SigFlag => Ok(Tag::SigFlag(SigFlag::from_str(value(1)?.as_ref())?)),
            TagKind::NSigs => Ok(Tag::NSigs(value(1)?.as_ref().parse()?)),
            TagKind::NSigsRefund => Ok(Tag::NSigsRefund(value(1)?.as_ref().parse()?)),
            TagKind::Locktime => Ok(Tag::LockTime(value(1)?.as_ref().parse()?)),
            TagKind::Refund => {
                let pubkeys = tag
                    .iter()
                    .skip(1)
                    .map(|p| PublicKey::from_str(p.as_ref()))
                    .collect::<Result<Vec<PublicKey>, _>>()?;

                Ok(Self::Refund(pubkeys))
            }
            TagKind::Pubkeys => {
                let pubkeys = tag
                    .iter()
                    .skip(1)
                    .map(|p| PublicKey::from_str(p.as_ref()))
                    .collect::<Result<Vec<PublicKey>, _>>()?;

                Ok(Self::PubKeys(pubkeys))
            }
            _ => Err(Error::UnknownTag),
        }
    }
}

impl From<Tag> for Vec<String> {
    fn from(data: Tag) -> Self {
        match data {
            Tag::SigFlag(sigflag) => vec![TagKind::SigFlag.to_string(), sigflag.to_string()],
            Tag::NSigs(num_sig) => vec![TagKind::NSigs.to_string(), num_sig.to_string()],
            Tag::NSigsRefund(num_sig) => {
                vec![TagKind::NSigsRefund.to_string(), num_sig.to_string()]
            }
            Tag::LockTime(locktime) => vec![TagKind::Locktime.to_string(), locktime.to_string()],
            Tag::PubKeys(pubkeys) => {
                let mut tag = vec![TagKind::Pubkeys.to_string()];
                for pubkey in pubkeys.into_iter() {
                    tag.push(pubkey.to_string())
                }
                tag
            }
            Tag::Refund(pubkeys) => {
                let mut tag = vec![TagKind::Refund.to_string()];

                for pubkey in pubkeys {
                    tag.push(pubkey.to_string())
                }
                tag
            }
        }
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data: Vec<String> = self.as_vec();
        let mut seq = serializer.serialize_seq(Some(data.len()))?;
        for element in data.into_iter() {
            seq.serialize_element(&element)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec: Vec<String> = Vec::deserialize(deserializer)?;
        Self::try_from(vec).map_err(DeserializerError::custom)
    }
}
