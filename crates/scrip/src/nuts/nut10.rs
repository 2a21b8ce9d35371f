//! NUT-10: Spending conditions
//!
//! <https://github.com/cashubtc/nuts/blob/main/10.md>

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// NUT10 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Secret does not carry a known spending condition kind
    #[error("Unknown secret kind")]
    UnknownKind,
    /// Secret is not a well formed tagged secret
    #[error("Malformed secret")]
    MalformedSecret,
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

/// NUT10 Secret Kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// NUT-11 P2PK
    P2PK,
    /// NUT-14 HTLC
    HTLC,
}

/// Secret data
///
/// The body of a tagged secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretData {
    /// Unique random string
    ///
    /// Makes otherwise identical conditions produce distinct secrets.
    pub nonce: String,
    /// Expresses the spending condition specific to each kind
    pub data: String,
    /// Additional data committed to and can be used for feature extensions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<String>>>,
}

impl SecretData {
    /// Create new [`SecretData`]
    pub fn new<S, V>(data: S, tags: Option<V>) -> Self
    where
        S: Into<String>,
        V: Into<Vec<Vec<String>>>,
    {
        let nonce = crate::secret::Secret::generate().to_string();

        Self {
            nonce,
            data: data.into(),
            tags: tags.map(|v| v.into()),
        }
    }
}

/// NUT10 Secret
///
/// Serialized as the two-element JSON array `[kind, data]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Secret {
    /// Kind of the spending condition
    pub kind: Kind,
    /// Secret Data
    pub secret_data: SecretData,
}

impl Secret {
    /// Create new [`Secret`]
    pub fn new<S, V>(kind: Kind, data: S, tags: Option<V>) -> Self
    where
        S: Into<String>,
        V: Into<Vec<Vec<String>>>,
    {
        let secret_data = SecretData::new(data, tags);
        Self { kind, secret_data }
    }
}

impl Serialize for Secret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_tuple(2)?;

        s.serialize_element(&self.kind)?;
        s.serialize_element(&self.secret_data)?;
        s.end()
    }
}

struct SecretVisitor;

impl<'de> Visitor<'de> for SecretVisitor {
    type Value = Secret;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a tuple with two elements: [Kind, SecretData]")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let kind = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let secret_data = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;

        // Reject any additional elements
        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(3, &self));
        }

        Ok(Secret { kind, secret_data })
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(SecretVisitor)
    }
}

impl TryFrom<Secret> for crate::secret::Secret {
    type Error = Error;
    fn try_from(secret: Secret) -> Result<crate::secret::Secret, Self::Error> {
        Ok(crate::secret::Secret::from_str(&serde_json::to_string(
            &secret,
        )?)?)
    }
}

impl TryFrom<&crate::secret::Secret> for Secret {
    type Error = Error;
    fn try_from(secret: &crate::secret::Secret) -> Result<Secret, Self::Error> {
        match serde_json::from_str(secret.to_string().as_str()) {
            Ok(secret) => Ok(secret),
            Err(_) => {
                // A two element array with a recognized kind but a bad body
                // is malformed; anything else is an opaque secret
                let value: serde_json::Value = serde_json::from_str(&secret.to_string())
                    .map_err(|_| Error::UnknownKind)?;

                match value.as_array().and_then(|array| array.first()) {
                    Some(kind) if kind == "P2PK" || kind == "HTLC" => Err(Error::MalformedSecret),
                    _ => Err(Error::UnknownKind),
                }
            }
        }
    }
}

impl TryFrom<crate::secret::Secret> for Secret {
    type Error = Error;
    fn try_from(secret: crate::secret::Secret) -> Result<Secret, Self::Error> {
        (&secret).try_into()
    }
}

#[cfg(test)]
mod tests {
    use std::assert_eq;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_secret_serialize() {
        let secret = Secret {
            kind: Kind::P2PK,
            secret_data: SecretData {
                nonce: "5d11913ee0f92fefdc82a6764fd2457a".to_string(),
                data: "026562efcfadc8e86d44da6a8adf80633d974302e62c850774db1fb36ff4cc7198"
                    .to_string(),
                tags: Some(vec![vec![
                    "key".to_string(),
                    "value1".to_string(),
                    "value2".to_string(),
                ]]),
            },
        };

        let secret_str = r#"["P2PK",{"nonce":"5d11913ee0f92fefdc82a6764fd2457a","data":"026562efcfadc8e86d44da6a8adf80633d974302e62c850774db1fb36ff4cc7198","tags":[["key","value1","value2"]]}]"#;

        assert_eq!(serde_json::to_string(&secret).unwrap(), secret_str);
    }

    #[test]
    fn test_secret_round_trip_serialization() {
        let original_secret = Secret {
            kind: Kind::P2PK,
            secret_data: SecretData {
                nonce: "5d11913ee0f92fefdc82a6764fd2457a".to_string(),
                data: "026562efcfadc8e86d44da6a8adf80633d974302e62c850774db1fb36ff4cc7198"
                    .to_string(),
                tags: None,
            },
        };

        let serialized = serde_json::to_string(&original_secret).unwrap();

        let deserialized_secret: Secret = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original_secret, deserialized_secret);

        // Also verify the conversion through the wallet secret type
        let wallet_secret = crate::secret::Secret::from_str(&serialized).unwrap();
        let deserialized_from_wallet: Secret = TryFrom::try_from(&wallet_secret).unwrap();
        assert_eq!(original_secret, deserialized_from_wallet);
    }

    #[test]
    fn test_malformed_secrets_rejected() {
        // Unknown kind
        let unknown = r#"["FROST",{"nonce":"aa","data":"bb"}]"#;
        assert!(serde_json::from_str::<Secret>(unknown).is_err());

        // Missing nonce
        let missing_nonce = r#"["P2PK",{"data":"bb"}]"#;
        assert!(serde_json::from_str::<Secret>(missing_nonce).is_err());

        // Missing data
        let missing_data = r#"["P2PK",{"nonce":"aa"}]"#;
        assert!(serde_json::from_str::<Secret>(missing_data).is_err());

        // Trailing element
        let trailing = r#"["P2PK",{"nonce":"aa","data":"bb"},"extra"]"#;
        assert!(serde_json::from_str::<Secret>(trailing).is_err());

        // Plain string secrets are not tagged secrets
        let opaque = crate::secret::Secret::generate();
        assert!(Secret::try_from(&opaque).is_err());
    }
}
