//! Client core for a federated-mint ecash wallet
//!
//! Deterministic output construction, proof lifecycle, blind-authentication
//! token pool and the OIDC flows that feed it. The HTTP layer is an abstract
//! [`HttpTransport`] with a reqwest implementation behind it.

pub mod auth;
pub mod client;
pub mod counter;
pub mod error;
pub mod outputs;
pub mod transport;

pub use self::auth::{AuthManager, OidcClient};
pub use self::client::MintClient;
pub use self::counter::{CounterSource, MemoryCounterSource, Range};
pub use self::error::Error;
pub use self::outputs::OutputBuilder;
pub use self::transport::{HttpTransport, ReqwestTransport};
