//! Authentication
//!
//! Some mints protect endpoints with either a clear authentication token
//! (a conventional OAuth2 bearer token, "CAT") or a blind authentication
//! token (an anonymous single-use proof, "BAT"). The [`AuthManager`] keeps a
//! pool of BATs topped up and serves exactly one per protected request; the
//! [`OidcClient`] runs the OAuth2 flows that produce the CAT.

mod manager;
mod oidc;

pub use manager::{AuthManager, ImportMode};
pub use oidc::{
    token_expires_at_ms, CatToken, DeviceAuthorization, OidcClient, OidcConfig, PkcePair,
    TokenResponse,
};
