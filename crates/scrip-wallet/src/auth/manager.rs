//! Blind auth token pool

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use scrip::mint_url::MintUrl;
use scrip::nuts::nut21::{Method, ProtectedEndpoint, RoutePath};
use scrip::nuts::{
    AuthProof, AuthRequired, BlindAuthToken, CurrencyUnit, KeySet, KeysResponse, KeysetResponse,
    MintAuthRequest, MintInfo, MintResponse, PreMintSecrets,
};
use scrip::Amount;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

use super::oidc::{token_expires_at_ms, unix_time_ms, CatToken, OidcClient};
use crate::client::decode_response;
use crate::error::Error;
use crate::transport::{HttpTransport, Request};

/// How the pool should treat existing entries on import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Drop the current pool before importing
    Replace,
    /// Keep the current pool and add the imported proofs
    Merge,
}

/// Callback invoked when the CAT changes
type TokenListener = Box<dyn Fn(&CatToken) + Send + Sync>;

#[derive(Debug, Default)]
struct PoolState {
    pool: VecDeque<AuthProof>,
    mint_info: Option<MintInfo>,
    active_keyset: Option<KeySet>,
}

/// Manages blind auth tokens for one mint
///
/// Keeps an inventory of single-use auth proofs, mints more in batches when
/// the pool runs low and serializes handing exactly one proof per protected
/// request. The clear auth token needed to mint the proofs is refreshed
/// through the attached [`OidcClient`].
pub struct AuthManager {
    mint_url: MintUrl,
    transport: Arc<dyn HttpTransport>,
    desired_pool_size: usize,
    max_per_mint: usize,
    state: Mutex<PoolState>,
    oidc: RwLock<Option<OidcClient>>,
    cat: RwLock<Option<CatToken>>,
    refresh_guard: Mutex<()>,
    listeners: std::sync::Mutex<Vec<TokenListener>>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("mint_url", &self.mint_url)
            .field("desired_pool_size", &self.desired_pool_size)
            .field("max_per_mint", &self.max_per_mint)
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    /// Remaining validity below which the CAT is refreshed before use
    pub const MIN_CAT_VALID_SECS: u64 = 10;

    /// Pool size targeted by top ups when none is configured
    const DEFAULT_POOL_SIZE: usize = 10;

    /// Create new [`AuthManager`]
    pub fn new(mint_url: MintUrl, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            mint_url,
            transport,
            desired_pool_size: Self::DEFAULT_POOL_SIZE,
            max_per_mint: 100,
            state: Mutex::new(PoolState::default()),
            oidc: RwLock::new(None),
            cat: RwLock::new(None),
            refresh_guard: Mutex::new(()),
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Set how many proofs top ups aim to keep pooled
    pub fn with_desired_pool_size(mut self, size: usize) -> Self {
        self.desired_pool_size = size;
        self
    }

    /// Cap the number of proofs minted in one request
    ///
    /// Clamped to at least one so a top up can always make progress.
    pub fn with_max_per_mint(mut self, max: usize) -> Self {
        self.max_per_mint = max.max(1);
        self
    }

    /// Attach an [`OidcClient`] for CAT refresh
    pub fn with_oidc_client(mut self, oidc: OidcClient) -> Self {
        *self.oidc.get_mut() = Some(oidc);
        self
    }

    /// Seed the manager with an existing CAT
    pub fn with_cat(mut self, access: String, refresh: Option<String>) -> Self {
        let expires_at_ms = token_expires_at_ms(
            &super::oidc::TokenResponse {
                access_token: access.clone(),
                refresh_token: refresh.clone(),
                expires_in: None,
                token_type: None,
            },
            unix_time_ms(),
        );

        *self.cat.get_mut() = Some(CatToken {
            access,
            refresh,
            expires_at_ms,
        });
        self
    }

    /// Register a callback for CAT changes
    ///
    /// Listeners run outside the token lock, after the new token is
    /// visible.
    pub fn on_token_change<F>(&self, listener: F)
    where
        F: Fn(&CatToken) + Send + Sync + 'static,
    {
        self.listeners
            .lock()
            .expect("Listener lock poisoned")
            .push(Box::new(listener));
    }

    fn notify_listeners(&self, token: &CatToken) {
        let listeners = self.listeners.lock().expect("Listener lock poisoned");
        for listener in listeners.iter() {
            listener(token);
        }
    }

    /// The mint this manager authenticates against
    pub fn mint_url(&self) -> &MintUrl {
        &self.mint_url
    }

    async fn fetch_mint_info(&self) -> Result<MintInfo, Error> {
        let url = self.mint_url.join_paths(&["v1", "info"])?;
        let response = self.transport.request(Request::get(url)).await?;
        decode_response(response)
    }

    async fn fetch_active_auth_keyset(&self) -> Result<KeySet, Error> {
        let url = self.mint_url.join_paths(&["v1", "auth", "blind", "keysets"])?;
        let response = self.transport.request(Request::get(url)).await?;
        let keysets: KeysetResponse = decode_response(response)?;

        let info = keysets
            .keysets
            .into_iter()
            .find(|keyset| keyset.active && keyset.unit == CurrencyUnit::Auth)
            .ok_or(Error::NoActiveKeyset)?;

        let url = self
            .mint_url
            .join_paths(&["v1", "auth", "blind", "keys", &info.id.to_string()])?;
        let response = self.transport.request(Request::get(url)).await?;
        let keys: KeysResponse = decode_response(response)?;

        let keyset = keys
            .keysets
            .into_iter()
            .find(|keyset| keyset.id == info.id)
            .ok_or(Error::KeyFetchMismatch)?;

        keyset.verify_id().map_err(|_| Error::KeyFetchMismatch)?;

        Ok(keyset)
    }

    /// Load mint info and the active auth keyset if not yet cached
    async fn load_prerequisites(&self, state: &mut PoolState) -> Result<(), Error> {
        if state.mint_info.is_none() {
            state.mint_info = Some(self.fetch_mint_info().await?);
        }

        if state.active_keyset.is_none() {
            state.active_keyset = Some(self.fetch_active_auth_keyset().await?);

            // Make sure an oidc client exists once the mint told us where
            // the provider lives
            let info = state.mint_info.as_ref().expect("Mint info loaded above");
            if self.oidc.read().await.is_none() {
                if let (Some(discovery), Some(client_id)) =
                    (info.openid_discovery(), info.client_id())
                {
                    *self.oidc.write().await = Some(OidcClient::new(
                        Arc::clone(&self.transport),
                        discovery,
                        client_id,
                    ));
                }
            }
        }

        Ok(())
    }

    /// Make sure at least `min` proofs are pooled
    ///
    /// Tops up with a single mint request; the batch size is bounded by the
    /// mint's `bat_max_mint` and the configured per-mint cap, so the pool
    /// can still be below `min` afterwards.
    #[instrument(skip(self))]
    pub async fn ensure(&self, min: usize) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        self.ensure_locked(&mut state, min).await
    }

    async fn ensure_locked(&self, state: &mut PoolState, min: usize) -> Result<(), Error> {
        self.load_prerequisites(state).await?;

        if state.pool.len() >= min {
            return Ok(());
        }

        let target = self.desired_pool_size.max(min);
        let missing = target - state.pool.len();

        let bat_max_mint = state
            .mint_info
            .as_ref()
            .and_then(MintInfo::bat_max_mint)
            .unwrap_or(u64::MAX);

        let batch = missing
            .min(bat_max_mint.try_into().unwrap_or(usize::MAX))
            .min(self.max_per_mint);

        self.top_up_locked(state, batch).await
    }

    /// Mint `count` new auth proofs into the pool
    #[instrument(skip(self))]
    pub async fn top_up(&self, count: usize) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        self.load_prerequisites(&mut state).await?;
        self.top_up_locked(&mut state, count).await
    }

    async fn top_up_locked(&self, state: &mut PoolState, count: usize) -> Result<(), Error> {
        if count == 0 {
            return Ok(());
        }

        let keyset = state
            .active_keyset
            .clone()
            .ok_or(Error::NoActiveKeyset)?;
        let info = state.mint_info.clone().unwrap_or_default();

        tracing::debug!("Minting {} blind auth proofs", count);

        let premint = PreMintSecrets::random_with_amounts(
            keyset.id,
            &vec![Amount::ONE; count],
        )?;

        let request = MintAuthRequest {
            outputs: premint.blinded_messages(),
        };

        let url = self.mint_url.join_paths(&["v1", "auth", "blind", "mint"])?;
        let mut http_request =
            Request::post_json(url, serde_json::to_value(&request)?);

        // The blind auth mint endpoint itself may demand clear auth
        let mint_endpoint = ProtectedEndpoint::new(Method::Post, RoutePath::MintBlindAuth);
        if info.auth_required(mint_endpoint) == Some(AuthRequired::Clear) {
            let cat = self.ensure_cat(Self::MIN_CAT_VALID_SECS).await?;
            http_request = http_request.header("Clear-auth", cat);
        }

        let response = self.transport.request(http_request).await?;
        let mint_response: MintResponse = decode_response(response)?;

        if mint_response.signatures.len() != count {
            return Err(Error::BadBatMintResponse(format!(
                "Requested {} signatures, got {}",
                count,
                mint_response.signatures.len()
            )));
        }

        // Auth proofs without a DLEQ cannot be verified offline later,
        // reject the batch rather than pool unverifiable proofs
        if mint_response
            .signatures
            .iter()
            .any(|signature| signature.dleq.is_none())
        {
            return Err(Error::Protocol(scrip::Error::DleqProofNotProvided));
        }

        // DLEQ verification happens during proof construction; one bad
        // signature fails the whole batch
        let proofs = scrip::dhke::construct_proofs(
            mint_response.signatures,
            premint.rs(),
            premint.secrets(),
            &keyset.keys,
        )?;

        let existing: HashSet<_> = state
            .pool
            .iter()
            .map(|proof| proof.secret.clone())
            .collect();

        for proof in proofs {
            let auth_proof = AuthProof::from(proof);
            if !existing.contains(&auth_proof.secret) {
                state.pool.push_back(auth_proof);
            }
        }

        Ok(())
    }

    /// Take one blind auth token for a request to `endpoint`
    ///
    /// Fully serialized: concurrent callers receive distinct proofs in the
    /// order they acquire the pool lock. The returned string is the value
    /// for the `Blind-auth` header.
    #[instrument(skip(self))]
    pub async fn get_blind_auth_token(
        &self,
        endpoint: ProtectedEndpoint,
    ) -> Result<String, Error> {
        let mut state = self.state.lock().await;

        self.ensure_locked(&mut state, 1).await?;

        let protected = state
            .mint_info
            .as_ref()
            .map(|info| info.auth_required(endpoint) == Some(AuthRequired::Blind))
            .unwrap_or(false);

        if !protected {
            tracing::warn!(
                "Issuing blind auth token for endpoint the mint does not declare protected: {:?}",
                endpoint
            );
        }

        let proof = state
            .pool
            .pop_front()
            .ok_or(Error::NoBlindAuthTokenAvailable)?;

        Ok(BlindAuthToken::new(proof).to_string())
    }

    /// Number of proofs currently pooled
    pub async fn pool_size(&self) -> usize {
        self.state.lock().await.pool.len()
    }

    /// Import auth proofs into the pool
    ///
    /// Entries are deduplicated by secret; proofs with an empty secret are
    /// rejected.
    #[instrument(skip(self, proofs))]
    pub async fn import_pool(
        &self,
        proofs: Vec<AuthProof>,
        mode: ImportMode,
    ) -> Result<usize, Error> {
        if proofs
            .iter()
            .any(|proof| proof.secret.as_bytes().is_empty())
        {
            return Err(Error::IncompleteAuthProof);
        }

        let mut state = self.state.lock().await;

        if mode == ImportMode::Replace {
            state.pool.clear();
        }

        let mut seen: HashSet<_> = state
            .pool
            .iter()
            .map(|proof| proof.secret.clone())
            .collect();

        let mut imported = 0;
        for proof in proofs {
            if seen.insert(proof.secret.clone()) {
                state.pool.push_back(proof);
                imported += 1;
            }
        }

        Ok(imported)
    }

    /// Copy of the pool, DLEQ proofs included
    pub async fn export_pool(&self) -> Vec<AuthProof> {
        self.state.lock().await.pool.iter().cloned().collect()
    }

    /// Current clear auth token, refreshing when it is about to expire
    ///
    /// A token with unknown expiry is trusted until the mint rejects it.
    /// Concurrent callers share one refresh attempt; if the refresh fails
    /// the stale token is returned and the failure only logged.
    #[instrument(skip(self))]
    pub async fn ensure_cat(&self, min_valid_secs: u64) -> Result<String, Error> {
        if let Some(access) = self.valid_cat(min_valid_secs).await {
            return Ok(access);
        }

        // Single flight: whoever holds the guard refreshes, everyone else
        // waits and re-reads
        let _guard = self.refresh_guard.lock().await;

        if let Some(access) = self.valid_cat(min_valid_secs).await {
            return Ok(access);
        }

        let current = self.cat.read().await.clone();
        let current = match current {
            Some(current) => current,
            None => return Err(Error::ClearAuthRequired),
        };

        let refresh_token = match &current.refresh {
            Some(token) => token.clone(),
            None => {
                tracing::warn!("CAT expired and no refresh token available");
                return Ok(current.access);
            }
        };

        let oidc = self.oidc.read().await.clone();
        let oidc = match oidc {
            Some(oidc) => oidc,
            None => {
                tracing::warn!("CAT expired and no oidc client attached");
                return Ok(current.access);
            }
        };

        match oidc.refresh(&refresh_token).await {
            Ok(response) => {
                let token = CatToken {
                    access: response.access_token.clone(),
                    refresh: response.refresh_token.clone().or(Some(refresh_token)),
                    expires_at_ms: token_expires_at_ms(&response, unix_time_ms()),
                };

                *self.cat.write().await = Some(token.clone());
                self.notify_listeners(&token);

                Ok(token.access)
            }
            Err(err) => {
                tracing::warn!("CAT refresh failed: {}", err);
                Ok(current.access)
            }
        }
    }

    async fn valid_cat(&self, min_valid_secs: u64) -> Option<String> {
        let cat = self.cat.read().await;
        let cat = cat.as_ref()?;

        match cat.expires_at_ms {
            // Unknown expiry is trusted until the server rejects it
            None => Some(cat.access.clone()),
            Some(expires_at_ms) => {
                (expires_at_ms > unix_time_ms() + min_valid_secs * 1000)
                    .then(|| cat.access.clone())
            }
        }
    }

    /// Replace the clear auth token
    ///
    /// Used after an interactive login. The expiry is taken from the JWT
    /// when decodable.
    pub async fn set_cat(&self, access: String, refresh: Option<String>) {
        let token = CatToken {
            expires_at_ms: token_expires_at_ms(
                &super::oidc::TokenResponse {
                    access_token: access.clone(),
                    refresh_token: refresh.clone(),
                    expires_in: None,
                    token_type: None,
                },
                unix_time_ms(),
            ),
            access,
            refresh,
        };

        *self.cat.write().await = Some(token.clone());
        self.notify_listeners(&token);
    }

    /// Store tokens from a completed OIDC flow
    pub async fn store_token_response(&self, response: super::oidc::TokenResponse) {
        let token = CatToken {
            access: response.access_token.clone(),
            refresh: response.refresh_token.clone(),
            expires_at_ms: token_expires_at_ms(&response, unix_time_ms()),
        };

        *self.cat.write().await = Some(token.clone());
        self.notify_listeners(&token);
    }

    /// The attached oidc client, if any
    pub async fn oidc_client(&self) -> Option<OidcClient> {
        self.oidc.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::str::FromStr;

    use bitcoin::base64::Engine;
    use bitcoin::secp256k1::Scalar;
    use scrip::dhke::hash_e;
    use scrip::nuts::nut12::BlindSignatureDleq;
    use scrip::nuts::{BlindSignature, Id, Keys, PublicKey, SecretKey};
    use scrip::secret::Secret;
    use scrip::SECP256K1;
    use serde_json::{json, Value};

    use super::*;
    use crate::transport::test_transport::MockTransport;
    use crate::transport::Body;

    /// A mint whose auth keyset is a single known key so that valid blind
    /// signatures with DLEQ can be produced in the test
    struct FakeMint {
        secret_key: SecretKey,
        keyset: KeySet,
    }

    impl FakeMint {
        fn new() -> Self {
            let secret_key = SecretKey::generate();
            let mut keys = BTreeMap::new();
            keys.insert(Amount::ONE, secret_key.public_key());
            let keys = Keys::new(keys);

            let keyset = KeySet {
                id: Id::from_keys(&keys),
                unit: CurrencyUnit::Auth,
                final_expiry: None,
                keys,
            };

            Self { secret_key, keyset }
        }

        fn keysets_json(&self) -> Value {
            json!({"keysets": [{
                "id": self.keyset.id.to_string(),
                "unit": "auth",
                "active": true,
                "input_fee_ppk": 0
            }]})
        }

        fn keys_json(&self) -> Value {
            serde_json::to_value(KeysResponse {
                keysets: vec![self.keyset.clone()],
            })
            .unwrap()
        }

        /// Sign the outputs of a mint auth request
        fn sign(&self, outputs: &[Value]) -> Value {
            let signatures: Vec<BlindSignature> = outputs
                .iter()
                .map(|output| {
                    let blinded_secret =
                        PublicKey::from_str(output["B_"].as_str().unwrap()).unwrap();

                    // C' = a*B'
                    let c: PublicKey = blinded_secret
                        .mul_tweak(&SECP256K1, &self.secret_key.as_scalar())
                        .unwrap()
                        .into();

                    // DLEQ
                    let r = SecretKey::generate();
                    let r1 = r.public_key();
                    let r2: PublicKey = blinded_secret
                        .mul_tweak(&SECP256K1, &r.as_scalar())
                        .unwrap()
                        .into();
                    let e_bytes = hash_e([r1, r2, self.secret_key.public_key(), c]);
                    let e = SecretKey::from_slice(&e_bytes).unwrap();
                    let ea = e.mul_tweak(&self.secret_key.as_scalar()).unwrap();
                    let s: SecretKey = r.add_tweak(&Scalar::from(ea)).unwrap().into();

                    BlindSignature {
                        amount: Amount::ONE,
                        keyset_id: self.keyset.id,
                        c,
                        dleq: Some(BlindSignatureDleq { e, s }),
                    }
                })
                .collect();

            json!({"signatures": signatures})
        }
    }

    fn mint_info_json(bat_max_mint: u64) -> Value {
        json!({
            "nuts": {
                "22": {
                    "bat_max_mint": bat_max_mint,
                    "protected_endpoints": [{"method": "POST", "path": "/v1/swap"}]
                }
            }
        })
    }

    fn auth_proof(secret: &str) -> AuthProof {
        AuthProof {
            keyset_id: Id::from_str("009a1f293253e41e").unwrap(),
            secret: Secret::new(secret),
            c: PublicKey::from_str(
                "02698c4e2b5f9534cd0687d87513c759790cf829aa5739184a3e3735471fbda904",
            )
            .unwrap(),
            dleq: None,
        }
    }

    fn manager_with(transport: Arc<MockTransport>) -> AuthManager {
        AuthManager::new("https://mint.example.com".parse().unwrap(), transport)
    }

    /// Handler that signs whatever outputs the manager submits
    fn signing_handler(
        mint: Arc<FakeMint>,
    ) -> impl Fn(&Request) -> Result<crate::transport::Response, Error> + Send + Sync {
        move |request: &Request| {
            let body = match &request.body {
                Some(Body::Json(body)) => body,
                _ => panic!("Expected json body"),
            };
            let outputs = body["outputs"].as_array().expect("outputs").clone();
            Ok(crate::transport::Response {
                status: 200,
                body: mint.sign(&outputs),
            })
        }
    }

    #[tokio::test]
    async fn test_ensure_tops_up_bounded_batch() {
        let mint = Arc::new(FakeMint::new());
        let transport = Arc::new(MockTransport::new());

        // bat_max_mint caps the batch below the desired pool size
        transport.push_json(200, mint_info_json(2));
        transport.push_json(200, mint.keysets_json());
        transport.push_json(200, mint.keys_json());
        transport.push_handler(signing_handler(Arc::clone(&mint)));

        let manager = manager_with(transport.clone()).with_desired_pool_size(5);

        manager.ensure(1).await.unwrap();

        // A single top up bounded by the mint's cap, not chained
        assert_eq!(manager.pool_size().await, 2);
        assert_eq!(transport.request_count(), 4);

        // Secrets in the pool are unique
        let exported = manager.export_pool().await;
        let secrets: std::collections::HashSet<_> =
            exported.iter().map(|p| p.secret.clone()).collect();
        assert_eq!(secrets.len(), exported.len());

        // Pooled proofs kept their DLEQ for later verification
        assert!(exported.iter().all(|p| p.dleq.is_some()));

        // Enough in the pool: no further top up
        manager.ensure(1).await.unwrap();
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn test_top_up_sends_clear_auth_when_required() {
        let mint = Arc::new(FakeMint::new());
        let transport = Arc::new(MockTransport::new());

        // The blind auth mint endpoint is declared clear-auth protected
        transport.push_json(
            200,
            json!({
                "nuts": {
                    "21": {
                        "openid_discovery": "https://auth.example.com/.well-known/openid-configuration",
                        "client_id": "wallet-client",
                        "protected_endpoints": [{"method": "POST", "path": "/v1/auth/blind/mint"}]
                    },
                    "22": {
                        "bat_max_mint": 10,
                        "protected_endpoints": [{"method": "POST", "path": "/v1/swap"}]
                    }
                }
            }),
        );
        transport.push_json(200, mint.keysets_json());
        transport.push_json(200, mint.keys_json());
        transport.push_handler(signing_handler(Arc::clone(&mint)));

        let manager = manager_with(transport.clone());
        manager.set_cat("the-cat".to_string(), None).await;

        manager.top_up(1).await.unwrap();
        assert_eq!(manager.pool_size().await, 1);

        let requests = transport.requests.lock().unwrap();
        let mint_request = requests.last().unwrap();
        assert!(mint_request
            .headers
            .iter()
            .any(|(k, v)| k == "Clear-auth" && v == "the-cat"));
    }

    #[tokio::test]
    async fn test_top_up_without_dleq_fails_batch() {
        let mint = Arc::new(FakeMint::new());
        let transport = Arc::new(MockTransport::new());

        transport.push_json(200, mint_info_json(10));
        transport.push_json(200, mint.keysets_json());
        transport.push_json(200, mint.keys_json());

        // Signatures stripped of their DLEQ proofs
        let mint_for_handler = Arc::clone(&mint);
        transport.push_handler(move |request: &Request| {
            let body = match &request.body {
                Some(Body::Json(body)) => body,
                _ => panic!("Expected json body"),
            };
            let outputs = body["outputs"].as_array().expect("outputs").clone();
            let mut response = mint_for_handler.sign(&outputs);
            for signature in response["signatures"].as_array_mut().expect("signatures") {
                signature.as_object_mut().expect("object").remove("dleq");
            }
            Ok(crate::transport::Response {
                status: 200,
                body: response,
            })
        });

        let manager = manager_with(transport);

        let err = manager.top_up(2).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(scrip::Error::DleqProofNotProvided)
        ));
        assert_eq!(manager.pool_size().await, 0);
    }

    #[tokio::test]
    async fn test_top_up_wrong_count_fails() {
        let mint = Arc::new(FakeMint::new());
        let transport = Arc::new(MockTransport::new());

        transport.push_json(200, mint_info_json(10));
        transport.push_json(200, mint.keysets_json());
        transport.push_json(200, mint.keys_json());

        let mint_for_handler = Arc::clone(&mint);
        transport.push_handler(move |request: &Request| {
            let body = match &request.body {
                Some(Body::Json(body)) => body,
                _ => panic!("Expected json body"),
            };
            let outputs = body["outputs"].as_array().expect("outputs");
            // Drop one signature
            let response = mint_for_handler.sign(&outputs[..outputs.len() - 1]);
            Ok(crate::transport::Response {
                status: 200,
                body: response,
            })
        });

        let manager = manager_with(transport);

        let err = manager.top_up(3).await.unwrap_err();
        assert!(matches!(err, Error::BadBatMintResponse(_)));
    }

    #[tokio::test]
    async fn test_get_blind_auth_token_drains_pool() {
        let transport = Arc::new(MockTransport::new());
        // Pool already has proofs; ensure(1) still loads mint info and keys
        transport.push_json(200, mint_info_json(50));

        let mint = FakeMint::new();
        transport.push_json(200, mint.keysets_json());
        transport.push_json(200, mint.keys_json());

        let manager = Arc::new(manager_with(transport));
        manager
            .import_pool(
                vec![auth_proof("s1"), auth_proof("s2")],
                ImportMode::Replace,
            )
            .await
            .unwrap();

        let endpoint = ProtectedEndpoint::new(Method::Post, RoutePath::Swap);

        let a = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_blind_auth_token(endpoint).await })
        };
        let b = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get_blind_auth_token(endpoint).await })
        };

        let token_a = a.await.unwrap().unwrap();
        let token_b = b.await.unwrap().unwrap();

        // Two concurrent callers get distinct proofs and the pool is empty
        assert_ne!(token_a, token_b);
        assert!(token_a.starts_with("authA"));
        assert!(token_b.starts_with("authA"));
        assert_eq!(manager.pool_size().await, 0);

        // Serialized tokens carry no DLEQ
        let decoded = BlindAuthToken::from_str(&token_a).unwrap();
        assert!(decoded.auth_proof.dleq.is_none());
    }

    #[tokio::test]
    async fn test_export_pool_is_deep_copy() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(transport);

        manager
            .import_pool(vec![auth_proof("s1")], ImportMode::Merge)
            .await
            .unwrap();

        let exported = manager.export_pool().await;
        assert_eq!(exported.len(), 1);

        // Mutating the export does not touch the pool
        drop(exported);
        assert_eq!(manager.pool_size().await, 1);
    }

    #[tokio::test]
    async fn test_import_rejects_empty_secret() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(transport);

        let result = manager
            .import_pool(vec![auth_proof("")], ImportMode::Merge)
            .await;

        assert!(matches!(result, Err(Error::IncompleteAuthProof)));
    }

    #[tokio::test]
    async fn test_ensure_cat_returns_unknown_expiry_token() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(transport);

        manager.set_cat("opaque-token".to_string(), None).await;

        let cat = manager.ensure_cat(10).await.unwrap();
        assert_eq!(cat, "opaque-token");
    }

    #[tokio::test]
    async fn test_ensure_cat_refreshes_expired_token() {
        let transport = Arc::new(MockTransport::new());

        // Discovery plus refresh response
        transport.push_json(
            200,
            json!({"token_endpoint": "https://auth.example.com/token"}),
        );
        transport.push_json(
            200,
            json!({"access_token": "fresh", "refresh_token": "refresh-2", "expires_in": 300}),
        );

        let manager = manager_with(Arc::clone(&transport));
        let oidc = OidcClient::new(
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            "https://auth.example.com/.well-known/openid-configuration".to_string(),
            "wallet-client".to_string(),
        );
        *manager.oidc.write().await = Some(oidc);

        // An already expired JWT: exp = 1000
        let payload = bitcoin::base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"exp":1000}"#);
        let stale = format!("aGVhZGVy.{payload}.c2ln");
        manager.set_cat(stale, Some("refresh-1".to_string())).await;

        let cat = manager.ensure_cat(10).await.unwrap();
        assert_eq!(cat, "fresh");
    }

    #[tokio::test]
    async fn test_ensure_cat_failure_returns_stale_token() {
        let transport = Arc::new(MockTransport::new());

        transport.push_json(
            200,
            json!({"token_endpoint": "https://auth.example.com/token"}),
        );
        transport.push_json(400, json!({"error": "invalid_grant"}));

        let manager = manager_with(Arc::clone(&transport));
        let oidc = OidcClient::new(
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            "https://auth.example.com/.well-known/openid-configuration".to_string(),
            "wallet-client".to_string(),
        );
        *manager.oidc.write().await = Some(oidc);

        let payload = bitcoin::base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"exp":1000}"#);
        let stale = format!("aGVhZGVy.{payload}.c2ln");
        manager
            .set_cat(stale.clone(), Some("refresh-1".to_string()))
            .await;

        // Refresh fails; the stale token comes back
        let cat = manager.ensure_cat(10).await.unwrap();
        assert_eq!(cat, stale);
    }

    #[tokio::test]
    async fn test_token_listeners_invoked() {
        let transport = Arc::new(MockTransport::new());
        let manager = manager_with(transport);

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_by_listener = Arc::clone(&seen);
        manager.on_token_change(move |token| {
            seen_by_listener
                .lock()
                .unwrap()
                .push(token.access.clone());
        });

        manager.set_cat("first".to_string(), None).await;
        manager.set_cat("second".to_string(), None).await;

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }
}
