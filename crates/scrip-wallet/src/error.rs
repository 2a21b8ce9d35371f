//! Wallet errors

use scrip::error::ErrorResponse;
use thiserror::Error;

/// Wallet Error
#[derive(Debug, Error)]
pub enum Error {
    /// Mint rejected the operation
    #[error("Mint operation failed: {0}")]
    MintOperation(ErrorResponse),
    /// Unexpected HTTP response status
    #[error("HTTP error {status}: {message}")]
    HttpResponse {
        /// Status code
        status: u16,
        /// Response body or status text
        message: String,
    },
    /// Request could not be sent or the response not received
    #[error("Network error: {0}")]
    Network(String),
    /// Operation was cancelled
    #[error("Cancelled")]
    Cancelled,
    /// Mint has no active keyset for the unit
    #[error("No active keyset")]
    NoActiveKeyset,
    /// Keys fetched from the mint do not hash to the keyset id
    #[error("Fetched keys do not match keyset id")]
    KeyFetchMismatch,
    /// Clear auth token required but not available
    #[error("Clear auth required")]
    ClearAuthRequired,
    /// Clear auth token was rejected
    #[error("Clear auth failed")]
    ClearAuthFailed,
    /// Blind auth token required but no auth manager attached
    #[error("Blind auth required")]
    BlindAuthRequired,
    /// Pool has no blind auth token to spend
    #[error("No blind auth token available")]
    NoBlindAuthTokenAvailable,
    /// Mint returned an unusable blind auth mint response
    #[error("Bad blind auth mint response: {0}")]
    BadBatMintResponse(String),
    /// Imported auth proof is missing a required field
    #[error("Auth proof missing required field")]
    IncompleteAuthProof,
    /// OIDC discovery document is missing required fields
    #[error("Invalid OIDC discovery document")]
    OidcDiscoveryInvalid,
    /// OIDC provider does not offer the requested flow
    #[error("OIDC endpoint not available: {0}")]
    OidcEndpointNotAvailable(String),
    /// OIDC token endpoint returned an error
    #[error("OIDC token error: {0}")]
    OidcToken(String),
    /// Jwt error
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] scrip::Error),
    /// NUT02 error
    #[error(transparent)]
    NUT02(#[from] scrip::nuts::nut02::Error),
    /// NUT12 error
    #[error(transparent)]
    NUT12(#[from] scrip::nuts::nut12::Error),
    /// Mint url error
    #[error(transparent)]
    MintUrl(#[from] scrip::mint_url::Error),
    /// Url parse error
    #[error(transparent)]
    UrlParse(#[from] url::ParseError),
    /// Serde Json error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// Custom error
    #[error("`{0}`")]
    Custom(String),
}

impl Error {
    /// Whether the failure happened in transit and the request may be
    /// retried against a cached endpoint
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}
