//! NUT-09: Restore signatures
//!
//! <https://github.com/cashubtc/nuts/blob/main/09.md>

use serde::{Deserialize, Serialize};

use super::nut00::{BlindSignature, BlindedMessage};

/// Restore Request [NUT-09]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    /// Outputs
    pub outputs: Vec<BlindedMessage>,
}

/// Restore Response [NUT-09]
///
/// The mint returns the subset of outputs it has seen before together with
/// the signatures it issued for them, in matching order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResponse {
    /// Outputs the mint has signed
    pub outputs: Vec<BlindedMessage>,
    /// Original signatures
    pub signatures: Vec<BlindSignature>,
}
