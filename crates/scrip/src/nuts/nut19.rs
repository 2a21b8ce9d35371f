//! NUT-19: Cached Responses
//!
//! <https://github.com/cashubtc/nuts/blob/main/19.md>
//!
//! Endpoints the mint declares here are safe to retry on a network failure:
//! the mint replays the original response instead of re-executing the
//! operation.

use serde::{Deserialize, Serialize};

use super::nut21::{Method, RoutePath};

/// Cached endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Number of seconds the responses are cached for
    pub ttl: Option<u64>,
    /// Cached endpoints
    pub cached_endpoints: Vec<CachedEndpoint>,
}

/// A method and path for which caching is enabled
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachedEndpoint {
    /// HTTP Method
    pub method: Method,
    /// Route path
    pub path: RoutePath,
}

impl CachedEndpoint {
    /// Create [`CachedEndpoint`]
    pub fn new(method: Method, path: RoutePath) -> Self {
        Self { method, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_deserialize() {
        let json = r#"{
            "ttl": 300,
            "cached_endpoints": [
                {"method": "POST", "path": "/v1/swap"},
                {"method": "POST", "path": "/v1/mint/bolt11"}
            ]
        }"#;

        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.ttl, Some(300));
        assert_eq!(
            settings.cached_endpoints,
            vec![
                CachedEndpoint::new(Method::Post, RoutePath::Swap),
                CachedEndpoint::new(Method::Post, RoutePath::MintBolt11),
            ]
        );
    }
}
