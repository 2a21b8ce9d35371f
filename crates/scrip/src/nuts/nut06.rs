//! NUT-06: Mint Information
//!
//! <https://github.com/cashubtc/nuts/blob/main/06.md>

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::nut01::PublicKey;
use super::nut21::ProtectedEndpoint;
use super::nut22::AuthRequired;
use super::{nut04, nut05, nut19, nut21, nut22};

/// Mint Version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MintVersion {
    /// Mint Software name
    pub name: String,
    /// Mint Version
    pub version: String,
}

impl Serialize for MintVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let combined = format!("{}/{}", self.name, self.version);
        serializer.serialize_str(&combined)
    }
}

impl<'de> Deserialize<'de> for MintVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let combined = String::deserialize(deserializer)?;
        let parts: Vec<&str> = combined.split('/').collect();
        if parts.len() != 2 {
            return Err(serde::de::Error::custom("Invalid version string"));
        }
        Ok(MintVersion {
            name: parts[0].to_string(),
            version: parts[1].to_string(),
        })
    }
}

/// Mint Info [NUT-06]
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInfo {
    /// name of the mint and should be recognizable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// hex pubkey of the mint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<PublicKey>,
    /// implementation name and the version running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<MintVersion>,
    /// short description of the mint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// long description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_long: Option<String>,
    /// Contact info
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<ContactInfo>>,
    /// shows which NUTs the mint supports
    #[serde(default)]
    pub nuts: Nuts,
    /// Mint's icon URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// message of the day that the wallet must display to the user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
    /// server unix timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,
}

impl MintInfo {
    /// Openid discovery url if the mint requires clear auth
    pub fn openid_discovery(&self) -> Option<String> {
        self.nuts
            .nut21
            .as_ref()
            .map(|settings| settings.openid_discovery.clone())
    }

    /// Client id to use with the openid provider
    pub fn client_id(&self) -> Option<String> {
        self.nuts
            .nut21
            .as_ref()
            .map(|settings| settings.client_id.clone())
    }

    /// Max number of blind auth tokens mintable per request
    pub fn bat_max_mint(&self) -> Option<u64> {
        self.nuts
            .nut22
            .as_ref()
            .map(|settings| settings.bat_max_mint)
    }

    /// The kind of auth the endpoint requires, if any
    ///
    /// Blind auth wins when an endpoint is declared under both NUTs.
    pub fn auth_required(&self, endpoint: ProtectedEndpoint) -> Option<AuthRequired> {
        if let Some(nut22) = &self.nuts.nut22 {
            if nut22.protected_endpoints.contains(&endpoint) {
                return Some(AuthRequired::Blind);
            }
        }

        if let Some(nut21) = &self.nuts.nut21 {
            if nut21.protected_endpoints.contains(&endpoint) {
                return Some(AuthRequired::Clear);
            }
        }

        None
    }

    /// Whether responses for the endpoint are cached and may be retried
    pub fn is_cached(&self, method: nut21::Method, path: nut21::RoutePath) -> bool {
        self.nuts
            .nut19
            .cached_endpoints
            .contains(&nut19::CachedEndpoint::new(method, path))
    }

    /// Cache ttl for retryable endpoints
    pub fn cache_ttl(&self) -> Option<u64> {
        self.nuts.nut19.ttl
    }
}

/// Supported nuts and settings
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nuts {
    /// NUT04 Settings
    #[serde(default)]
    #[serde(rename = "4")]
    pub nut04: nut04::Settings,
    /// NUT05 Settings
    #[serde(default)]
    #[serde(rename = "5")]
    pub nut05: nut05::Settings,
    /// NUT07 Settings
    #[serde(default)]
    #[serde(rename = "7")]
    pub nut07: SupportedSettings,
    /// NUT08 Settings
    #[serde(default)]
    #[serde(rename = "8")]
    pub nut08: SupportedSettings,
    /// NUT09 Settings
    #[serde(default)]
    #[serde(rename = "9")]
    pub nut09: SupportedSettings,
    /// NUT10 Settings
    #[serde(default)]
    #[serde(rename = "10")]
    pub nut10: SupportedSettings,
    /// NUT11 Settings
    #[serde(default)]
    #[serde(rename = "11")]
    pub nut11: SupportedSettings,
    /// NUT12 Settings
    #[serde(default)]
    #[serde(rename = "12")]
    pub nut12: SupportedSettings,
    /// NUT13 Settings
    #[serde(default)]
    #[serde(rename = "13")]
    pub nut13: SupportedSettings,
    /// NUT14 Settings
    #[serde(default)]
    #[serde(rename = "14")]
    pub nut14: SupportedSettings,
    /// NUT19 Settings
    #[serde(default)]
    #[serde(rename = "19")]
    pub nut19: nut19::Settings,
    /// NUT21 Settings
    #[serde(default)]
    #[serde(rename = "21")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nut21: Option<nut21::Settings>,
    /// NUT22 Settings
    #[serde(default)]
    #[serde(rename = "22")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nut22: Option<nut22::Settings>,
}

/// Whether a nut is supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupportedSettings {
    /// Supported
    pub supported: bool,
}

impl Default for SupportedSettings {
    fn default() -> Self {
        Self { supported: false }
    }
}

/// Contact method to reach the mint operator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Contact Method i.e. nostr
    pub method: String,
    /// Contact info i.e. npub
    pub info: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuts::nut21::{Method, RoutePath};

    #[test]
    fn test_mint_info_deserialize() {
        let mint_info_str = r#"{
            "name": "Example mint",
            "pubkey": "0296d0aa13b6a31cf0cd974249f28c7b7176d7274712c95a41c7d8066d3f29d679",
            "version": "Nutshell/0.15.0",
            "description": "An example mint",
            "nuts": {
                "4": {"methods": [{"method": "bolt11", "unit": "sat"}], "disabled": false},
                "5": {"methods": [{"method": "bolt11", "unit": "sat"}], "disabled": false},
                "7": {"supported": true},
                "12": {"supported": true},
                "19": {"ttl": 300, "cached_endpoints": [{"method": "POST", "path": "/v1/swap"}]}
            }
        }"#;

        let info: MintInfo = serde_json::from_str(mint_info_str).unwrap();

        assert_eq!(info.name.as_deref(), Some("Example mint"));
        assert_eq!(info.version.as_ref().unwrap().name, "Nutshell");
        assert!(info.nuts.nut07.supported);
        assert!(info.is_cached(Method::Post, RoutePath::Swap));
        assert!(!info.is_cached(Method::Post, RoutePath::MeltBolt11));
        assert_eq!(info.cache_ttl(), Some(300));
        assert!(info.openid_discovery().is_none());
    }

    #[test]
    fn test_auth_required() {
        let mint_info_str = r#"{
            "nuts": {
                "21": {
                    "openid_discovery": "https://auth.example.com/.well-known/openid-configuration",
                    "client_id": "wallet-client",
                    "protected_endpoints": [{"method": "POST", "path": "/v1/auth/blind/mint"}]
                },
                "22": {
                    "bat_max_mint": 50,
                    "protected_endpoints": [{"method": "POST", "path": "/v1/swap"}]
                }
            }
        }"#;

        let info: MintInfo = serde_json::from_str(mint_info_str).unwrap();

        assert_eq!(
            info.auth_required(ProtectedEndpoint::new(Method::Post, RoutePath::Swap)),
            Some(AuthRequired::Blind)
        );
        assert_eq!(
            info.auth_required(ProtectedEndpoint::new(Method::Post, RoutePath::MintBlindAuth)),
            Some(AuthRequired::Clear)
        );
        assert_eq!(
            info.auth_required(ProtectedEndpoint::new(Method::Post, RoutePath::Restore)),
            None
        );
        assert_eq!(info.bat_max_mint(), Some(50));
        assert_eq!(info.client_id().as_deref(), Some("wallet-client"));
    }
}
