//! NUT-07: Spendable Check
//!
//! <https://github.com/cashubtc/nuts/blob/main/07.md>

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::Witness;
use super::nut01::PublicKey;

/// NUT07 Error
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown State error
    #[error("Unknown state")]
    UnknownState,
}

/// State of a proof from the mint's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Proof has not been spent
    Unspent,
    /// Proof is being spent in an in-flight transaction
    Pending,
    /// Proof has been spent
    Spent,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspent => write!(f, "UNSPENT"),
            Self::Pending => write!(f, "PENDING"),
            Self::Spent => write!(f, "SPENT"),
        }
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state {
            "UNSPENT" => Ok(Self::Unspent),
            "PENDING" => Ok(Self::Pending),
            "SPENT" => Ok(Self::Spent),
            _ => Err(Error::UnknownState),
        }
    }
}

/// Check spendable request
///
/// Proofs are identified by `Y = hash_to_curve(secret)` so the request does
/// not disclose the secrets themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateRequest {
    /// Ys of the proofs to check
    #[serde(rename = "Ys")]
    pub ys: Vec<PublicKey>,
}

/// Proof state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofState {
    /// Y of the proof
    #[serde(rename = "Y")]
    pub y: PublicKey,
    /// State of the proof
    pub state: State,
    /// Witness data if it is supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
}

/// Check spendable response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// Proof states
    pub states: Vec<ProofState>,
}
