//! Protocol types and cryptography for a Chaumian-ecash wallet talking to a
//! federated mint: blind Diffie-Hellman key exchange over secp256k1,
//! deterministic secret derivation, spending conditions (P2PK, HTLC) and the
//! auth token formats.

pub mod amount;
pub mod dhke;
pub mod error;
pub mod mint_url;
pub mod nuts;
pub mod secret;
pub mod util;

pub use self::amount::Amount;
pub use self::error::Error;
pub use self::mint_url::MintUrl;
pub use self::util::SECP256K1;
