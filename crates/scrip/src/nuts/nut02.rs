//! NUT-02: Keysets and keyset ID
//!
//! <https://github.com/cashubtc/nuts/blob/main/02.md>

use core::fmt;
use core::str::FromStr;
use std::array::TryFromSliceError;

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::Hash;
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, VecSkipError};
use thiserror::Error;

use super::nut00::CurrencyUnit;
use super::nut01::Keys;
use crate::util::hex;

/// NUT02 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Hex Error
    #[error(transparent)]
    HexError(#[from] hex::Error),
    /// Keyset length error
    #[error("Keyset id length invalid")]
    Length,
    /// Unknown version
    #[error("Unknown keyset id version")]
    UnknownVersion,
    /// Keyset id does not match keys
    #[error("Keyset id does not match keys")]
    IdMismatch,
    /// Keyset contains an amount that is not a power of two
    #[error("Keyset amounts must be powers of two")]
    InvalidKeysetAmount,
    /// Slice Error
    #[error(transparent)]
    Slice(#[from] TryFromSliceError),
}

/// Keyset version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeySetVersion {
    /// Current Version 00
    Version00,
}

impl KeySetVersion {
    /// [`KeySetVersion`] to byte
    pub fn to_byte(&self) -> u8 {
        match self {
            Self::Version00 => 0,
        }
    }

    /// [`KeySetVersion`] from byte
    pub fn from_byte(byte: &u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(Self::Version00),
            _ => Err(Error::UnknownVersion),
        }
    }
}

impl fmt::Display for KeySetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySetVersion::Version00 => f.write_str("00"),
        }
    }
}

/// A keyset ID is an identifier for a specific keyset. It can be derived by
/// anyone who knows the set of public keys of a mint. Tokens carry the id of
/// the keyset they were issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    version: KeySetVersion,
    id: [u8; Self::BYTELEN],
}

impl Id {
    const STRLEN: usize = 14;
    const BYTELEN: usize = 7;

    /// [`Id`] to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        [vec![self.version.to_byte()], self.id.to_vec()].concat()
    }

    /// [`Id`] from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != Self::BYTELEN + 1 {
            return Err(Error::Length);
        }
        Ok(Self {
            version: KeySetVersion::from_byte(&bytes[0])?,
            id: bytes[1..].try_into()?,
        })
    }

    /// [`Id`] from [`Keys`]
    ///
    /// 1. sort public keys by their amount in ascending order
    /// 2. concatenate all public keys to one byte string
    /// 3. SHA256 the concatenation
    /// 4. take the first 14 characters of the hex-encoded hash
    /// 5. prefix with the keyset id version byte
    pub fn from_keys(map: &Keys) -> Self {
        let mut keys: Vec<_> = map.iter().collect();
        keys.sort_by_key(|(amt, _v)| *amt);

        let pubkeys_concat: Vec<u8> = keys
            .iter()
            .map(|(_, pubkey)| pubkey.to_bytes())
            .collect::<Vec<[u8; 33]>>()
            .concat();

        let hash = Sha256::hash(&pubkeys_concat);
        let hex_of_hash = hex::encode(hash.to_byte_array());

        Self {
            version: KeySetVersion::Version00,
            id: hex::decode(&hex_of_hash[0..Self::STRLEN])
                .expect("Keys hash could not be hex decoded")
                .try_into()
                .expect("Invalid length of hex id"),
        }
    }
}

impl TryFrom<Id> for u32 {
    type Error = Error;

    /// Derivation index for a keyset id
    ///
    /// The id bytes interpreted as a big-endian integer, reduced mod 2^31 - 1
    /// so that it is always a valid hardened child number.
    fn try_from(value: Id) -> Result<Self, Self::Error> {
        let hex_bytes: [u8; 8] = value.to_bytes().try_into().map_err(|_| Error::Length)?;

        let int = u64::from_be_bytes(hex_bytes);

        Ok((int % (2_u64.pow(31) - 1)) as u32)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format!("{}{}", self.version, hex::encode(self.id)))
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::STRLEN + 2 {
            return Err(Error::Length);
        }

        Ok(Self {
            version: KeySetVersion::from_byte(&hex::decode(&s[..2])?[0])?,
            id: hex::decode(&s[2..])?
                .try_into()
                .map_err(|_| Error::Length)?,
        })
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl serde::de::Visitor<'_> for IdVisitor {
            type Value = Id;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a 16 char hex string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Id::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(IdVisitor)
    }
}

/// Mint keysets [NUT-02]
///
/// Unknown or malformed entries from the mint are skipped rather than failing
/// the whole response.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// Keyset infos
    #[serde_as(as = "VecSkipError<_>")]
    pub keysets: Vec<KeySetInfo>,
}

/// Keyset
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySet {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Expiry of the keyset, seconds since unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_expiry: Option<u64>,
    /// Keyset [`Keys`]
    pub keys: Keys,
}

impl KeySet {
    /// Check that the keyset id matches the keys and that every amount is a
    /// power of two
    pub fn verify_id(&self) -> Result<(), Error> {
        if self.keys.iter().any(|(amount, _)| !amount.is_power_of_two()) {
            return Err(Error::InvalidKeysetAmount);
        }

        if Id::from_keys(&self.keys) != self.id {
            return Err(Error::IdMismatch);
        }

        Ok(())
    }
}

/// KeySetInfo
#[derive(Debug, Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeySetInfo {
    /// Keyset [`Id`]
    pub id: Id,
    /// Keyset [`CurrencyUnit`]
    pub unit: CurrencyUnit,
    /// Whether the mint is still signing with this keyset
    pub active: bool,
    /// Input fee per thousand spent proofs, in the keyset unit
    #[serde(default)]
    pub input_fee_ppk: u32,
    /// Expiry of the keyset, seconds since unix epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_expiry: Option<u64>,
}
