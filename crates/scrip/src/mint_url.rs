//! Mint base url

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Url Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Url error
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Invalid URL structure
    #[error("Invalid URL")]
    InvalidUrl,
}

/// MintUrl Url
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MintUrl(String);

impl MintUrl {
    fn format_url(url: &str) -> Result<Self, Error> {
        if url.is_empty() {
            return Err(Error::InvalidUrl);
        }
        let url = url.trim_end_matches('/');
        // Verify the url is valid
        let formatted_url = Url::parse(url)?;
        let host = formatted_url.host_str().ok_or(Error::InvalidUrl)?;

        // Scheme and host are case-insensitive, keep the rest as given
        let normalized = format!(
            "{}://{}",
            formatted_url.scheme().to_lowercase(),
            host.to_lowercase()
        );
        let path = formatted_url.path().trim_end_matches('/');
        let port = formatted_url
            .port()
            .map(|p| format!(":{p}"))
            .unwrap_or_default();

        Ok(Self(format!("{normalized}{port}{path}")))
    }

    /// Join onto url
    pub fn join(&self, path: &str) -> Result<Url, Error> {
        // The stored form never has a trailing slash
        Ok(Url::parse(&format!("{}/{}", self.0, path))?)
    }

    /// Append path elements onto the URL
    pub fn join_paths(&self, path_elements: &[&str]) -> Result<Url, Error> {
        self.join(&path_elements.join("/"))
    }
}

impl FromStr for MintUrl {
    type Err = Error;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        MintUrl::format_url(url)
    }
}

impl TryFrom<Url> for MintUrl {
    type Error = Error;

    fn try_from(url: Url) -> Result<MintUrl, Self::Error> {
        MintUrl::from_str(url.as_str())
    }
}

impl fmt::Display for MintUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for MintUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MintUrl::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_slashes() {
        let very_unformatted_url = "http://url-to-check.com////";
        let unformatted_url = "http://url-to-check.com/";
        let formatted_url = "http://url-to-check.com";

        let very_trimmed_url = MintUrl::from_str(very_unformatted_url).unwrap();
        assert_eq!(formatted_url, very_trimmed_url.to_string());

        let trimmed_url = MintUrl::from_str(unformatted_url).unwrap();
        assert_eq!(formatted_url, trimmed_url.to_string());

        let unchanged_url = MintUrl::from_str(formatted_url).unwrap();
        assert_eq!(formatted_url, unchanged_url.to_string());
    }

    #[test]
    fn test_case_insensitive() {
        let wrong_cased_url = "http://URL-to-check.com";
        let correct_cased_url = "http://url-to-check.com";

        let cased_url_formatted = MintUrl::from_str(wrong_cased_url).unwrap();
        assert_eq!(correct_cased_url, cased_url_formatted.to_string());
    }

    #[test]
    fn test_join_paths() {
        let url = MintUrl::from_str("https://mint.example.com").unwrap();
        assert_eq!(
            "https://mint.example.com/v1/keys",
            url.join_paths(&["v1", "keys"]).unwrap().to_string()
        );

        let url_with_path = MintUrl::from_str("https://mint.example.com/cashu/").unwrap();
        assert_eq!(
            "https://mint.example.com/cashu/v1/keysets",
            url_with_path
                .join_paths(&["v1", "keysets"])
                .unwrap()
                .to_string()
        );
    }
}
