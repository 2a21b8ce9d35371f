//! HTTP transport abstraction
//!
//! The rest of the crate only needs a single request operation. Status
//! handling and body decoding stay with the callers, which have different
//! rules for mint and OIDC endpoints.

use async_trait::async_trait;
use scrip::nuts::nut21::Method;
use serde_json::Value;
use url::Url;

use crate::error::Error;

/// A request to be performed by the transport
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute url
    pub url: Url,
    /// Additional headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<Body>,
}

/// Request body
#[derive(Debug, Clone)]
pub enum Body {
    /// JSON body
    Json(Value),
    /// `application/x-www-form-urlencoded` body
    ///
    /// Spaces are encoded as `+`.
    Form(Vec<(String, String)>),
}

impl Request {
    /// New GET request
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::Get,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// New POST request with a json body
    pub fn post_json(url: Url, body: Value) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body: Some(Body::Json(body)),
        }
    }

    /// New POST request with a form body
    pub fn post_form(url: Url, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url,
            headers: Vec::new(),
            body: Some(Body::Form(form)),
        }
    }

    /// Attach a header
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// A received response
///
/// Any response that arrived is `Ok`, whatever its status; only transport
/// failures are errors.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body decoded as json, `Null` when the body was empty or not
    /// json
    pub body: Value,
}

impl Response {
    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport over which requests are performed
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// Perform the request
    ///
    /// Errors only with [`Error::Network`]; callers interpret the status.
    async fn request(&self, request: Request) -> Result<Response, Error>;
}

/// [`HttpTransport`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    /// Create new [`ReqwestTransport`]
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Create [`ReqwestTransport`] from a preconfigured client
    ///
    /// Use this to set proxies or timeout policy.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { inner: client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(&self, request: Request) -> Result<Response, Error> {
        let mut builder = match request.method {
            Method::Get => self.inner.get(request.url),
            Method::Post => self.inner.post(request.url),
        };

        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }

        builder = match request.body {
            Some(Body::Json(json)) => builder.json(&json),
            Some(Body::Form(form)) => builder.form(&form),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);

        Ok(Response { status, body })
    }
}
