//! NUT-22: Blind Authentication
//!
//! <https://github.com/cashubtc/nuts/blob/main/22.md>

use std::fmt;
use std::str::FromStr;

use bitcoin::base64::engine::general_purpose;
use bitcoin::base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::{BlindedMessage, Proof};
use super::nut01::PublicKey;
use super::nut02::Id;
use super::nut12::ProofDleq;
use super::nut21::{Method, ProtectedEndpoint};
use crate::dhke::hash_to_curve;
use crate::secret::Secret;
use crate::Amount;

/// NUT22 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid Prefix
    #[error("Invalid prefix")]
    InvalidPrefix,
    /// DHKE error
    #[error("Could not hash to curve")]
    HashToCurve,
    /// Base64 error
    #[error(transparent)]
    Base64Error(#[from] bitcoin::base64::DecodeError),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Utf8 parse error
    #[error(transparent)]
    Utf8ParseError(#[from] std::string::FromUtf8Error),
}

/// Blind auth settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Settings {
    /// Max number of blind auth tokens that can be minted per request
    pub bat_max_mint: u64,
    /// Protected endpoints
    pub protected_endpoints: Vec<ProtectedEndpoint>,
}

impl Settings {
    /// Create new [`Settings`]
    pub fn new(bat_max_mint: u64, protected_endpoints: Vec<ProtectedEndpoint>) -> Self {
        Self {
            bat_max_mint,
            protected_endpoints,
        }
    }
}

// Mints may declare protected endpoints as regex patterns; they are expanded
// to the matching routes on deserialization.
impl<'de> Deserialize<'de> for Settings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use std::collections::HashSet;

        use super::nut21::matching_route_paths;

        #[derive(Deserialize)]
        struct RawSettings {
            bat_max_mint: u64,
            protected_endpoints: Vec<RawProtectedEndpoint>,
        }

        #[derive(Deserialize)]
        struct RawProtectedEndpoint {
            method: Method,
            path: String,
        }

        let raw = RawSettings::deserialize(deserializer)?;

        let mut protected_endpoints = HashSet::new();

        for raw_endpoint in raw.protected_endpoints {
            let expanded_paths = matching_route_paths(&raw_endpoint.path).map_err(|e| {
                serde::de::Error::custom(format!(
                    "Invalid regex pattern '{}': {}",
                    raw_endpoint.path, e
                ))
            })?;

            for path in expanded_paths {
                protected_endpoints.insert(ProtectedEndpoint::new(raw_endpoint.method, path));
            }
        }

        Ok(Settings {
            bat_max_mint: raw.bat_max_mint,
            protected_endpoints: protected_endpoints.into_iter().collect(),
        })
    }
}

/// Auth Token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthToken {
    /// Clear Auth token
    ClearAuth(String),
    /// Blind Auth token
    BlindAuth(BlindAuthToken),
}

impl fmt::Display for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClearAuth(cat) => cat.fmt(f),
            Self::BlindAuth(bat) => bat.fmt(f),
        }
    }
}

impl AuthToken {
    /// Header key for auth token type
    pub fn header_key(&self) -> String {
        match self {
            Self::ClearAuth(_) => "Clear-auth".to_string(),
            Self::BlindAuth(_) => "Blind-auth".to_string(),
        }
    }
}

/// Required Auth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthRequired {
    /// Clear Auth token
    Clear,
    /// Blind Auth token
    Blind,
}

/// Auth Proof
///
/// An auth proof has no amount; one proof authenticates one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProof {
    /// `Keyset id`
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// Secret message
    pub secret: Secret,
    /// Unblinded signature
    #[serde(rename = "C")]
    pub c: PublicKey,
    /// Auth Proof DLEQ
    ///
    /// Never sent to the mint; stripped when the token is serialized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dleq: Option<ProofDleq>,
}

impl AuthProof {
    /// Y of [`AuthProof`]
    pub fn y(&self) -> Result<PublicKey, Error> {
        hash_to_curve(self.secret.as_bytes()).map_err(|_| Error::HashToCurve)
    }

    /// Copy without the DLEQ proof
    pub fn without_dleq(&self) -> Self {
        Self {
            keyset_id: self.keyset_id,
            secret: self.secret.clone(),
            c: self.c,
            dleq: None,
        }
    }
}

impl From<AuthProof> for Proof {
    fn from(value: AuthProof) -> Self {
        Self {
            amount: Amount::ONE,
            keyset_id: value.keyset_id,
            secret: value.secret,
            c: value.c,
            witness: None,
            dleq: value.dleq,
        }
    }
}

impl From<Proof> for AuthProof {
    fn from(value: Proof) -> Self {
        Self {
            keyset_id: value.keyset_id,
            secret: value.secret,
            c: value.c,
            dleq: value.dleq,
        }
    }
}

/// Blind Auth Token
///
/// Serialized as `authA` followed by the base64 url-safe encoding of the
/// json [`AuthProof`] without DLEQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindAuthToken {
    /// [AuthProof]
    pub auth_proof: AuthProof,
}

/// Prefix of a serialized [`BlindAuthToken`]
pub const BLIND_AUTH_TOKEN_PREFIX: &str = "authA";

impl BlindAuthToken {
    /// Create new [`BlindAuthToken`]
    pub fn new(auth_proof: AuthProof) -> Self {
        BlindAuthToken {
            auth_proof: auth_proof.without_dleq(),
        }
    }
}

impl fmt::Display for BlindAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The DLEQ would link issuance and redemption, never serialize it
        let json_string =
            serde_json::to_string(&self.auth_proof.without_dleq()).map_err(|_| fmt::Error)?;
        let encoded = general_purpose::URL_SAFE.encode(json_string);
        write!(f, "{BLIND_AUTH_TOKEN_PREFIX}{encoded}")
    }
}

impl FromStr for BlindAuthToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let encoded = s
            .strip_prefix(BLIND_AUTH_TOKEN_PREFIX)
            .ok_or(Error::InvalidPrefix)?;

        let json_string = general_purpose::URL_SAFE.decode(encoded)?;

        let json_str = String::from_utf8(json_string)?;

        let auth_proof: AuthProof = serde_json::from_str(&json_str)?;

        Ok(BlindAuthToken { auth_proof })
    }
}

/// Mint auth request [NUT-22]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAuthRequest {
    /// Outputs
    pub outputs: Vec<BlindedMessage>,
}

impl MintAuthRequest {
    /// Count of requested tokens
    pub fn amount(&self) -> u64 {
        self.outputs.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blind_auth_token_round_trip() {
        let proof: AuthProof = serde_json::from_str(
            r#"{"id":"00882760bfa2eb41","secret":"daf4dd00a2b68a0858a80450f52c8a7d2ccf87d375e43e216e0c571f089f63e9","C":"024369d2d22a80ecf78f3937da9d5f30c1b9f74f0c32684d583cca0fa6a61cdcfc","dleq":{"e":"b31e58ac6527f34975ffab13e70a48b6d2b0d35abc4b03f0151f09ee1a9763d4","s":"8fbae004c59e754d71df67e392b6ae4e29293113ddc2ec86592a0431d16306d8","r":"a6d13fcd7a18442e6076f5e1e7c887ad5de40a019824bdfa9fe740d302e8d861"}}"#,
        )
        .unwrap();

        let token = BlindAuthToken::new(proof.clone());
        let serialized = token.to_string();

        assert!(serialized.starts_with(BLIND_AUTH_TOKEN_PREFIX));

        let decoded = BlindAuthToken::from_str(&serialized).unwrap();

        // DLEQ is stripped on serialization
        assert!(decoded.auth_proof.dleq.is_none());
        assert_eq!(decoded.auth_proof.keyset_id, proof.keyset_id);
        assert_eq!(decoded.auth_proof.secret, proof.secret);
        assert_eq!(decoded.auth_proof.c, proof.c);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(matches!(
            BlindAuthToken::from_str("authBdGVzdA"),
            Err(Error::InvalidPrefix)
        ));
    }

    #[test]
    fn test_settings_deserialize() {
        let json = r#"{
            "bat_max_mint": 50,
            "protected_endpoints": [
                {"method": "POST", "path": "/v1/swap"}
            ]
        }"#;

        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.bat_max_mint, 50);
        assert_eq!(settings.protected_endpoints.len(), 1);
    }
}
