//! Open Id Connect client
//!
//! Discovery, device-code flow, token refresh and PKCE auth-code flow
//! against the provider the mint declares for clear authentication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitcoin::base64::engine::general_purpose;
use bitcoin::base64::Engine;
use bitcoin::hashes::sha256::Hash as Sha256Hash;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::rand::{thread_rng, Rng};
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use url::Url;

use crate::error::Error;
use crate::transport::{HttpTransport, Request};

/// Device code grant type urn
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
/// Poll interval when the provider does not suggest one
const DEFAULT_POLL_INTERVAL: u64 = 5;
/// Characters allowed in a PKCE code verifier
const PKCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
/// Length of generated PKCE code verifiers
const PKCE_VERIFIER_LEN: usize = 64;

/// Milliseconds since unix epoch
pub(crate) fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Discovered provider configuration
///
/// Only `token_endpoint` is required; flows needing the other endpoints fail
/// when the provider does not offer them.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// Token endpoint
    pub token_endpoint: String,
    /// Authorization endpoint for the auth-code flow
    pub authorization_endpoint: Option<String>,
    /// Device authorization endpoint
    pub device_authorization_endpoint: Option<String>,
    /// JWKS url
    pub jwks_uri: Option<String>,
    /// Issuer
    pub issuer: Option<String>,
}

/// Response to a device authorization request
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    /// Code the client polls with
    pub device_code: String,
    /// Code the user enters at the verification uri
    pub user_code: String,
    /// Where the user authorizes the device
    pub verification_uri: String,
    /// Verification uri with the user code embedded
    pub verification_uri_complete: Option<String>,
    /// Suggested poll interval in seconds
    pub interval: Option<u64>,
    /// Lifetime of the device code in seconds
    pub expires_in: Option<u64>,
}

/// Response from the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: Option<i64>,
    /// Token type
    pub token_type: Option<String>,
}

/// A clear auth token with its refresh state
#[derive(Debug, Clone)]
pub struct CatToken {
    /// Access token sent as the `Clear-auth` header
    pub access: String,
    /// Refresh token if the provider issued one
    pub refresh: Option<String>,
    /// When the access token expires, unknown when the provider said
    /// nothing and the token is not a decodable JWT
    pub expires_at_ms: Option<u64>,
}

/// A PKCE verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Code verifier, kept by the client
    pub verifier: String,
    /// Code challenge sent with the authorization request
    pub challenge: String,
}

impl PkcePair {
    /// Generate a new verifier and challenge
    ///
    /// `challenge = base64url(SHA256(verifier))` without padding.
    pub fn generate() -> Self {
        let mut rng = thread_rng();
        let verifier: String = (0..PKCE_VERIFIER_LEN)
            .map(|_| PKCE_CHARSET[rng.gen_range(0..PKCE_CHARSET.len())] as char)
            .collect();

        let challenge = Self::challenge_for(&verifier);

        Self {
            verifier,
            challenge,
        }
    }

    /// S256 challenge for a verifier
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256Hash::hash(verifier.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(digest.to_byte_array())
    }
}

/// When the access token expires, in unix milliseconds
///
/// `expires_in` wins when the provider sent one; otherwise the `exp` claim
/// of the JWT payload is used, accepting both numeric and numeric-string
/// forms. `None` means unknown expiry: the token is trusted until the
/// server rejects it.
pub fn token_expires_at_ms(response: &TokenResponse, now_ms: u64) -> Option<u64> {
    match response.expires_in {
        Some(expires_in) if expires_in > 0 => Some(now_ms + (expires_in as u64) * 1000),
        _ => jwt_exp_ms(&response.access_token),
    }
}

fn jwt_exp_ms(jwt: &str) -> Option<u64> {
    let payload = jwt.split('.').nth(1)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    let exp = match claims.get("exp")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }?;

    Some(exp * 1000)
}

/// Open Id Connect client
#[derive(Debug, Clone)]
pub struct OidcClient {
    transport: Arc<dyn HttpTransport>,
    openid_discovery: String,
    client_id: String,
    config: Arc<RwLock<Option<OidcConfig>>>,
    jwks: Arc<RwLock<Option<JwkSet>>>,
}

impl OidcClient {
    /// Create new [`OidcClient`]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        openid_discovery: String,
        client_id: String,
    ) -> Self {
        Self {
            transport,
            openid_discovery,
            client_id,
            config: Arc::new(RwLock::new(None)),
            jwks: Arc::new(RwLock::new(None)),
        }
    }

    /// Client id registered with the provider
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Provider configuration, fetched once from the well-known url
    #[instrument(skip(self))]
    pub async fn config(&self) -> Result<OidcConfig, Error> {
        if let Some(config) = self.config.read().await.as_ref() {
            return Ok(config.clone());
        }

        tracing::debug!("Fetching oidc config");
        let url = Url::parse(&self.openid_discovery)?;
        let response = self.transport.request(Request::get(url)).await?;

        if !response.is_success() {
            return Err(Error::OidcDiscoveryInvalid);
        }

        let config: OidcConfig =
            serde_json::from_value(response.body).map_err(|_| Error::OidcDiscoveryInvalid)?;

        *self.config.write().await = Some(config.clone());

        Ok(config)
    }

    async fn token_request(&self, form: Vec<(String, String)>) -> Result<TokenResponse, Error> {
        let config = self.config().await?;
        let url = Url::parse(&config.token_endpoint).map_err(|_| Error::OidcDiscoveryInvalid)?;

        let response = self
            .transport
            .request(Request::post_form(url, form))
            .await?;

        if !response.is_success() {
            return Err(Error::OidcToken(token_error_description(&response.body)));
        }

        Ok(serde_json::from_value(response.body)?)
    }

    /// Start the device-code flow
    #[instrument(skip(self))]
    pub async fn device_start(&self, scope: Option<&str>) -> Result<DeviceAuthorization, Error> {
        let config = self.config().await?;
        let endpoint = config.device_authorization_endpoint.ok_or_else(|| {
            Error::OidcEndpointNotAvailable("device_authorization_endpoint".to_string())
        })?;

        let mut form = vec![("client_id".to_string(), self.client_id.clone())];
        if let Some(scope) = scope {
            form.push(("scope".to_string(), scope.to_string()));
        }

        let url = Url::parse(&endpoint).map_err(|_| Error::OidcDiscoveryInvalid)?;
        let response = self.transport.request(Request::post_form(url, form)).await?;

        if !response.is_success() {
            return Err(Error::OidcToken(token_error_description(&response.body)));
        }

        Ok(serde_json::from_value(response.body)?)
    }

    /// Poll the token endpoint until the user authorizes the device
    ///
    /// Sleeps the provider's suggested interval between polls, backs off on
    /// `slow_down` and stops when the device code expires. Cancelling the
    /// token rejects with [`Error::Cancelled`] at the next pre-sleep check.
    #[instrument(skip_all)]
    pub async fn device_poll(
        &self,
        device: &DeviceAuthorization,
        cancel: CancellationToken,
    ) -> Result<TokenResponse, Error> {
        let mut interval = device.interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        let deadline = device
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(Duration::from_secs(interval)) => {}
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::OidcToken("expired_token".to_string()));
                }
            }

            let config = self.config().await?;
            let url =
                Url::parse(&config.token_endpoint).map_err(|_| Error::OidcDiscoveryInvalid)?;

            let form = vec![
                ("grant_type".to_string(), DEVICE_CODE_GRANT.to_string()),
                ("device_code".to_string(), device.device_code.clone()),
                ("client_id".to_string(), self.client_id.clone()),
            ];

            let response = self.transport.request(Request::post_form(url, form)).await?;

            if response.is_success() {
                return Ok(serde_json::from_value(response.body)?);
            }

            let error = response
                .body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");

            match error {
                "authorization_pending" => continue,
                "slow_down" => {
                    interval = (interval + 5).max(interval * 2);
                    tracing::debug!("Provider asked to slow down, interval now {}s", interval);
                }
                _ => return Err(Error::OidcToken(token_error_description(&response.body))),
            }
        }
    }

    /// Exchange a refresh token for new tokens
    ///
    /// Strict: any non-2xx is an error.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        self.token_request(vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ])
        .await
    }

    /// Resource-owner password grant
    #[instrument(skip(self, password))]
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, Error> {
        self.token_request(vec![
            ("grant_type".to_string(), "password".to_string()),
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ])
        .await
    }

    /// Authorization url for the PKCE auth-code flow
    pub async fn build_auth_code_url(
        &self,
        redirect_uri: &str,
        scope: &str,
        state: &str,
        pkce: &PkcePair,
    ) -> Result<String, Error> {
        let config = self.config().await?;
        let endpoint = config
            .authorization_endpoint
            .ok_or_else(|| Error::OidcEndpointNotAvailable("authorization_endpoint".to_string()))?;

        let mut url = Url::parse(&endpoint).map_err(|_| Error::OidcDiscoveryInvalid)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", scope)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Trade an authorization code for tokens
    #[instrument(skip_all)]
    pub async fn exchange_auth_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        self.token_request(vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code.to_string()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
            ("code_verifier".to_string(), code_verifier.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ])
        .await
    }

    async fn jwks(&self, jwks_uri: &str) -> Result<JwkSet, Error> {
        if let Some(jwks) = self.jwks.read().await.as_ref() {
            return Ok(jwks.clone());
        }

        let url = Url::parse(jwks_uri).map_err(|_| Error::OidcDiscoveryInvalid)?;
        let response = self.transport.request(Request::get(url)).await?;

        if !response.is_success() {
            return Err(Error::OidcDiscoveryInvalid);
        }

        let jwks: JwkSet =
            serde_json::from_value(response.body).map_err(|_| Error::OidcDiscoveryInvalid)?;

        *self.jwks.write().await = Some(jwks.clone());

        Ok(jwks)
    }

    /// Verify a CAT against the provider's signing keys
    ///
    /// Checks signature, expiry and issuer; the audience is not checked
    /// since providers differ on how they fill it.
    #[instrument(skip_all)]
    pub async fn verify_cat(&self, cat_jwt: &str) -> Result<(), Error> {
        let header = decode_header(cat_jwt)?;

        let kid = header
            .kid
            .ok_or_else(|| Error::OidcToken("Missing kid header".to_string()))?;

        let config = self.config().await?;
        let jwks_uri = config
            .jwks_uri
            .ok_or_else(|| Error::OidcEndpointNotAvailable("jwks_uri".to_string()))?;

        let jwks = self.jwks(&jwks_uri).await?;

        let jwk = match jwks.find(&kid) {
            Some(jwk) => jwk.clone(),
            None => {
                // The provider may have rotated keys since the last fetch
                *self.jwks.write().await = None;
                let refreshed = self.jwks(&jwks_uri).await?;
                refreshed
                    .find(&kid)
                    .ok_or_else(|| Error::OidcToken("Unknown signing key".to_string()))?
                    .clone()
            }
        };

        let decoding_key = match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)?,
            AlgorithmParameters::EllipticCurve(ecdsa) => {
                DecodingKey::from_ec_components(&ecdsa.x, &ecdsa.y)?
            }
            _ => return Err(Error::OidcToken("Unsupported signing algorithm".to_string())),
        };

        let validation = {
            let mut validation = Validation::new(header.alg);
            validation.validate_exp = true;
            validation.validate_aud = false;
            if let Some(issuer) = &config.issuer {
                validation.set_issuer(&[issuer]);
            }
            validation
        };

        decode::<HashMap<String, Value>>(cat_jwt, &decoding_key, &validation)?;

        Ok(())
    }
}

fn token_error_description(body: &Value) -> String {
    body.get("error_description")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string()
}
