//! Mint client
//!
//! Typed access to the mint API over an [`HttpTransport`]. Handles the
//! `{code, detail}` error body convention, attaches auth headers for
//! endpoints the mint declares protected and retries cached endpoints on
//! network failure.

use std::sync::Arc;
use std::time::Duration;

use scrip::error::ErrorResponse;
use scrip::mint_url::MintUrl;
use scrip::nuts::nut21::{Method, ProtectedEndpoint, RoutePath};
use scrip::nuts::{
    AuthRequired, CheckStateRequest, CheckStateResponse, Id, KeySet, KeysResponse, KeysetResponse,
    MeltQuoteRequest, MeltQuoteResponse, MeltRequest, MintInfo, MintQuoteRequest,
    MintQuoteResponse, MintRequest, MintResponse, PaymentMethod, RestoreRequest, RestoreResponse,
    SwapRequest, SwapResponse,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::instrument;

use crate::auth::AuthManager;
use crate::error::Error;
use crate::transport::{HttpTransport, Request, Response};

/// Base delay between retries of a cached endpoint
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
/// Cap on the retry delay
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);
/// Retries after the initial attempt
const RETRY_MAX_ATTEMPTS: u32 = 9;

/// Decode a mint response
///
/// HTTP 400 bodies follow the `{code, detail}` convention; anything else
/// that is not a 2xx or fails to decode is surfaced with its status.
pub(crate) fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
    if response.status == 400 {
        let error_response = ErrorResponse::from_value(response.body)?;
        return Err(Error::MintOperation(error_response));
    }

    if !response.is_success() {
        return Err(Error::HttpResponse {
            status: response.status,
            message: response.body.to_string(),
        });
    }

    match serde_json::from_value::<T>(response.body.clone()) {
        Ok(decoded) => Ok(decoded),
        Err(err) => {
            tracing::warn!("Could not decode mint response: {}", err);
            match ErrorResponse::from_value(response.body) {
                Ok(error_response) => Err(Error::MintOperation(error_response)),
                Err(err) => Err(err.into()),
            }
        }
    }
}

/// Http client for the mint API
#[derive(Debug, Clone)]
pub struct MintClient {
    mint_url: MintUrl,
    transport: Arc<dyn HttpTransport>,
    auth: Option<Arc<AuthManager>>,
    mint_info: Arc<RwLock<Option<MintInfo>>>,
}

impl MintClient {
    /// Create new [`MintClient`]
    pub fn new(mint_url: MintUrl, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            mint_url,
            transport,
            auth: None,
            mint_info: Arc::new(RwLock::new(None)),
        }
    }

    /// Attach an [`AuthManager`] supplying auth headers for protected
    /// endpoints
    pub fn with_auth(mut self, auth: Arc<AuthManager>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// The url of the mint
    pub fn mint_url(&self) -> &MintUrl {
        &self.mint_url
    }

    /// Attach the auth header the endpoint requires
    async fn auth_header(&self, endpoint: ProtectedEndpoint, request: Request) -> Result<Request, Error> {
        let info = self.mint_info.read().await.clone();

        let required = match info {
            Some(info) => info.auth_required(endpoint),
            None => None,
        };

        match required {
            Some(AuthRequired::Blind) => {
                let auth = self.auth.as_ref().ok_or(Error::BlindAuthRequired)?;
                let token = auth.get_blind_auth_token(endpoint).await?;
                Ok(request.header("Blind-auth", token))
            }
            Some(AuthRequired::Clear) => {
                let auth = self.auth.as_ref().ok_or(Error::ClearAuthRequired)?;
                let cat = auth.ensure_cat(AuthManager::MIN_CAT_VALID_SECS).await?;
                Ok(request.header("Clear-auth", cat))
            }
            None => Ok(request),
        }
    }

    /// Send a request, retrying cached endpoints on network failure
    ///
    /// Exponential backoff from 100 ms capped at 1 s, at most 9 retries,
    /// bounded by the ttl the mint declared for its cache. Only network
    /// errors are retried.
    async fn send(&self, request: Request, endpoint: Option<ProtectedEndpoint>) -> Result<Response, Error> {
        let cached = match (&endpoint, self.mint_info.read().await.as_ref()) {
            (Some(endpoint), Some(info)) => info.is_cached(endpoint.method, endpoint.path),
            _ => false,
        };

        let request = match endpoint {
            Some(endpoint) => self.auth_header(endpoint, request).await?,
            None => request,
        };

        if !cached {
            return self.transport.request(request).await;
        }

        let ttl = self
            .mint_info
            .read()
            .await
            .as_ref()
            .and_then(MintInfo::cache_ttl)
            .map(Duration::from_secs);
        let started = Instant::now();

        let mut attempt: u32 = 0;
        loop {
            match self.transport.request(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_network() => {
                    let out_of_time = ttl
                        .map(|ttl| started.elapsed() >= ttl)
                        .unwrap_or(false);

                    if attempt >= RETRY_MAX_ATTEMPTS || out_of_time {
                        return Err(err);
                    }

                    let delay = RETRY_BASE_DELAY
                        .saturating_mul(2_u32.saturating_pow(attempt))
                        .min(RETRY_MAX_DELAY);

                    tracing::debug!(
                        "Network error on cached endpoint, retry {} in {:?}",
                        attempt + 1,
                        delay
                    );

                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, paths: &[&str]) -> Result<T, Error> {
        let url = self.mint_url.join_paths(paths)?;
        let response = self.send(Request::get(url), None).await?;
        decode_response(response)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        paths: &[&str],
        body: Value,
        endpoint: Option<ProtectedEndpoint>,
    ) -> Result<T, Error> {
        let url = self.mint_url.join_paths(paths)?;
        let response = self.send(Request::post_json(url, body), endpoint).await?;
        decode_response(response)
    }

    /// Get Mint Info [NUT-06]
    ///
    /// The info is cached for auth and retry decisions on later requests.
    #[instrument(skip(self))]
    pub async fn get_mint_info(&self) -> Result<MintInfo, Error> {
        let info: MintInfo = self.get(&["v1", "info"]).await?;

        *self.mint_info.write().await = Some(info.clone());

        Ok(info)
    }

    /// Get Active Mint Keys [NUT-01]
    #[instrument(skip(self))]
    pub async fn get_mint_keys(&self) -> Result<Vec<KeySet>, Error> {
        let response: KeysResponse = self.get(&["v1", "keys"]).await?;
        Ok(response.keysets)
    }

    /// Get Keyset Keys [NUT-01]
    ///
    /// The returned keys are checked against the requested id.
    #[instrument(skip(self))]
    pub async fn get_mint_keyset(&self, keyset_id: Id) -> Result<KeySet, Error> {
        let response: KeysResponse = self
            .get(&["v1", "keys", &keyset_id.to_string()])
            .await?;

        let keyset = response
            .keysets
            .into_iter()
            .find(|keyset| keyset.id == keyset_id)
            .ok_or(Error::KeyFetchMismatch)?;

        keyset.verify_id().map_err(|_| Error::KeyFetchMismatch)?;

        Ok(keyset)
    }

    /// Get Keysets [NUT-02]
    #[instrument(skip(self))]
    pub async fn get_mint_keysets(&self) -> Result<KeysetResponse, Error> {
        self.get(&["v1", "keysets"]).await
    }

    /// Mint Quote [NUT-04]
    #[instrument(skip(self, request))]
    pub async fn post_mint_quote(
        &self,
        method: PaymentMethod,
        request: MintQuoteRequest,
    ) -> Result<MintQuoteResponse, Error> {
        let endpoint = match method {
            PaymentMethod::Bolt12 => {
                ProtectedEndpoint::new(Method::Post, RoutePath::MintQuoteBolt12)
            }
            _ => ProtectedEndpoint::new(Method::Post, RoutePath::MintQuoteBolt11),
        };

        self.post(
            &["v1", "mint", "quote", &method.to_string()],
            serde_json::to_value(request)?,
            Some(endpoint),
        )
        .await
    }

    /// Mint Quote status [NUT-04]
    #[instrument(skip(self))]
    pub async fn get_mint_quote_status(
        &self,
        method: PaymentMethod,
        quote_id: &str,
    ) -> Result<MintQuoteResponse, Error> {
        self.get(&["v1", "mint", "quote", &method.to_string(), quote_id])
            .await
    }

    /// Mint Tokens [NUT-04]
    #[instrument(skip(self, request))]
    pub async fn post_mint(
        &self,
        method: PaymentMethod,
        request: MintRequest,
    ) -> Result<MintResponse, Error> {
        let endpoint = match method {
            PaymentMethod::Bolt12 => ProtectedEndpoint::new(Method::Post, RoutePath::MintBolt12),
            _ => ProtectedEndpoint::new(Method::Post, RoutePath::MintBolt11),
        };

        self.post(
            &["v1", "mint", &method.to_string()],
            serde_json::to_value(request)?,
            Some(endpoint),
        )
        .await
    }

    /// Melt Quote [NUT-05]
    #[instrument(skip(self, request))]
    pub async fn post_melt_quote(
        &self,
        method: PaymentMethod,
        request: MeltQuoteRequest,
    ) -> Result<MeltQuoteResponse, Error> {
        let endpoint = match method {
            PaymentMethod::Bolt12 => {
                ProtectedEndpoint::new(Method::Post, RoutePath::MeltQuoteBolt12)
            }
            _ => ProtectedEndpoint::new(Method::Post, RoutePath::MeltQuoteBolt11),
        };

        self.post(
            &["v1", "melt", "quote", &method.to_string()],
            serde_json::to_value(request)?,
            Some(endpoint),
        )
        .await
    }

    /// Melt [NUT-05]
    #[instrument(skip(self, request))]
    pub async fn post_melt(
        &self,
        method: PaymentMethod,
        request: MeltRequest,
    ) -> Result<MeltQuoteResponse, Error> {
        let endpoint = match method {
            PaymentMethod::Bolt12 => ProtectedEndpoint::new(Method::Post, RoutePath::MeltBolt12),
            _ => ProtectedEndpoint::new(Method::Post, RoutePath::MeltBolt11),
        };

        self.post(
            &["v1", "melt", &method.to_string()],
            serde_json::to_value(request)?,
            Some(endpoint),
        )
        .await
    }

    /// Swap [NUT-03]
    #[instrument(skip(self, request))]
    pub async fn post_swap(&self, request: SwapRequest) -> Result<SwapResponse, Error> {
        self.post(
            &["v1", "swap"],
            serde_json::to_value(request)?,
            Some(ProtectedEndpoint::new(Method::Post, RoutePath::Swap)),
        )
        .await
    }

    /// Spendable check [NUT-07]
    #[instrument(skip(self, request))]
    pub async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        self.post(
            &["v1", "checkstate"],
            serde_json::to_value(request)?,
            Some(ProtectedEndpoint::new(Method::Post, RoutePath::Checkstate)),
        )
        .await
    }

    /// Restore [NUT-09]
    #[instrument(skip(self, request))]
    pub async fn post_restore(&self, request: RestoreRequest) -> Result<RestoreResponse, Error> {
        self.post(
            &["v1", "restore"],
            serde_json::to_value(request)?,
            Some(ProtectedEndpoint::new(Method::Post, RoutePath::Restore)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::test_transport::MockTransport;

    fn client_with(transport: Arc<MockTransport>) -> MintClient {
        MintClient::new(
            "https://mint.example.com".parse().unwrap(),
            transport,
        )
    }

    #[tokio::test]
    async fn test_mint_operation_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(400, json!({"code": 11001, "detail": "Token already spent"}));

        let client = client_with(transport);
        let err = client.get_mint_keysets().await.unwrap_err();

        match err {
            Error::MintOperation(res) => {
                assert_eq!(res.code.to_code(), 11001);
                assert_eq!(res.detail, "Token already spent");
            }
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_http_response_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(502, json!("bad gateway"));

        let client = client_with(transport);
        let err = client.get_mint_keysets().await.unwrap_err();

        assert!(matches!(err, Error::HttpResponse { status: 502, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_endpoint_retries_network_errors() {
        let transport = Arc::new(MockTransport::new());

        // Mint declares the swap endpoint cached
        transport.push_json(
            200,
            json!({
                "nuts": {
                    "19": {"ttl": 300, "cached_endpoints": [{"method": "POST", "path": "/v1/swap"}]}
                }
            }),
        );
        transport.push_network_error("connection reset");
        transport.push_network_error("connection reset");
        transport.push_json(200, json!({"signatures": []}));

        let client = client_with(transport.clone());
        client.get_mint_info().await.unwrap();

        let response = client
            .post_swap(SwapRequest::new(vec![], vec![]))
            .await
            .unwrap();

        assert!(response.signatures.is_empty());
        // Info request plus two failures and the success
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_network_errors_not_retried() {
        let transport = Arc::new(MockTransport::new());

        transport.push_json(
            200,
            json!({
                "nuts": {
                    "19": {"ttl": 300, "cached_endpoints": [{"method": "POST", "path": "/v1/swap"}]}
                }
            }),
        );
        transport.push_json(400, json!({"code": 11002, "detail": "Transaction unbalanced"}));

        let client = client_with(transport.clone());
        client.get_mint_info().await.unwrap();

        let err = client
            .post_swap(SwapRequest::new(vec![], vec![]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MintOperation(_)));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let transport = Arc::new(MockTransport::new());

        transport.push_json(
            200,
            json!({
                "nuts": {
                    "19": {"cached_endpoints": [{"method": "POST", "path": "/v1/swap"}], "ttl": null}
                }
            }),
        );
        for _ in 0..10 {
            transport.push_network_error("offline");
        }

        let client = client_with(transport.clone());
        client.get_mint_info().await.unwrap();

        let err = client
            .post_swap(SwapRequest::new(vec![], vec![]))
            .await
            .unwrap_err();

        assert!(err.is_network());
        // Initial attempt plus nine retries, plus the info request
        assert_eq!(transport.request_count(), 11);
    }

    #[tokio::test]
    async fn test_uncached_endpoint_not_retried() {
        let transport = Arc::new(MockTransport::new());
        transport.push_network_error("offline");

        let client = client_with(transport.clone());
        let err = client
            .post_swap(SwapRequest::new(vec![], vec![]))
            .await
            .unwrap_err();

        assert!(err.is_network());
        assert_eq!(transport.request_count(), 1);
    }
}
