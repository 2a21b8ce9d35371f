//! Errors

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::util::hex;

/// Protocol error
#[derive(Debug, Error)]
pub enum Error {
    /// No valid point could be found on the curve
    #[error("No valid point on curve")]
    NoValidPoint,
    /// Keys for amount not in keyset
    #[error("Amount key not found in keyset")]
    AmountKeyNotFound,
    /// Keyset id does not match the keys it was fetched with
    #[error("Keyset id does not match keys")]
    KeysetIdMismatch,
    /// Keyset contains an amount that is not a power of two
    #[error("Keyset amounts must be powers of two")]
    InvalidKeysetAmount,
    /// DLEQ proof was expected but missing
    #[error("Dleq proof not provided")]
    DleqProofNotProvided,
    /// DLEQ proof did not verify
    #[error("Could not verify Dleq proof")]
    CouldNotVerifyDleq,
    /// Amount Error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// Secret error
    #[error(transparent)]
    Secret(#[from] crate::secret::Error),
    /// Bip32 error
    #[error(transparent)]
    Bip32(#[from] bitcoin::bip32::Error),
    /// Secp256k1 error
    #[error(transparent)]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    /// Hex error
    #[error(transparent)]
    Hex(#[from] hex::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    /// NUT01 error
    #[error(transparent)]
    NUT01(#[from] crate::nuts::nut01::Error),
    /// NUT02 error
    #[error(transparent)]
    NUT02(#[from] crate::nuts::nut02::Error),
    /// NUT10 error
    #[error(transparent)]
    NUT10(#[from] crate::nuts::nut10::Error),
    /// NUT11 error
    #[error(transparent)]
    NUT11(#[from] crate::nuts::nut11::Error),
    /// NUT12 error
    #[error(transparent)]
    NUT12(#[from] crate::nuts::nut12::Error),
    /// NUT13 error
    #[error("Could not derive secrets: {0}")]
    NUT13(String),
    /// NUT14 error
    #[error(transparent)]
    NUT14(#[from] crate::nuts::nut14::Error),
    /// Custom Error
    #[error("`{0}`")]
    Custom(String),
}

/// Error code on the wire
///
/// Codes a mint can return in an [`ErrorResponse`]. Unknown codes are
/// preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Blinded Message Already Signed
    BlindedMessageAlreadySigned,
    /// Token Already Spent
    TokenAlreadySpent,
    /// Transaction Unbalanced
    TransactionUnbalanced,
    /// Unit Unsupported
    UnitUnsupported,
    /// Keyset Unknown
    KeysetNotFound,
    /// Keyset Inactive
    KeysetInactive,
    /// Lightning Error
    LightningError,
    /// Quote not paid
    QuoteNotPaid,
    /// Tokens already issued for quote
    TokensAlreadyIssued,
    /// Minting Disabled
    MintingDisabled,
    /// Quote Pending
    QuotePending,
    /// Invoice Already Paid
    InvoiceAlreadyPaid,
    /// Quote Expired
    QuoteExpired,
    /// Witness missing or invalid
    WitnessMissingOrInvalid,
    /// Clear auth required
    ClearAuthRequired,
    /// Clear auth failed
    ClearAuthFailed,
    /// Blind auth required
    BlindAuthRequired,
    /// Blind auth failed
    BlindAuthFailed,
    /// Unknown error code
    Unknown(u16),
}

impl ErrorCode {
    /// Error code from u16
    pub fn from_code(code: u16) -> Self {
        match code {
            10002 => Self::BlindedMessageAlreadySigned,
            11001 => Self::TokenAlreadySpent,
            11002 => Self::TransactionUnbalanced,
            11005 => Self::UnitUnsupported,
            12001 => Self::KeysetNotFound,
            12002 => Self::KeysetInactive,
            20000 => Self::LightningError,
            20001 => Self::QuoteNotPaid,
            20002 => Self::TokensAlreadyIssued,
            20003 => Self::MintingDisabled,
            20005 => Self::QuotePending,
            20006 => Self::InvoiceAlreadyPaid,
            20007 => Self::QuoteExpired,
            20008 => Self::WitnessMissingOrInvalid,
            30001 => Self::ClearAuthRequired,
            30002 => Self::ClearAuthFailed,
            31001 => Self::BlindAuthRequired,
            31002 => Self::BlindAuthFailed,
            _ => Self::Unknown(code),
        }
    }

    /// Error code to u16
    pub fn to_code(&self) -> u16 {
        match self {
            Self::BlindedMessageAlreadySigned => 10002,
            Self::TokenAlreadySpent => 11001,
            Self::TransactionUnbalanced => 11002,
            Self::UnitUnsupported => 11005,
            Self::KeysetNotFound => 12001,
            Self::KeysetInactive => 12002,
            Self::LightningError => 20000,
            Self::QuoteNotPaid => 20001,
            Self::TokensAlreadyIssued => 20002,
            Self::MintingDisabled => 20003,
            Self::QuotePending => 20005,
            Self::InvoiceAlreadyPaid => 20006,
            Self::QuoteExpired => 20007,
            Self::WitnessMissingOrInvalid => 20008,
            Self::ClearAuthRequired => 30001,
            Self::ClearAuthFailed => 30002,
            Self::BlindAuthRequired => 31001,
            Self::BlindAuthFailed => 31002,
            Self::Unknown(code) => *code,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u16(self.to_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;
        Ok(Self::from_code(code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

/// Error response from the mint
///
/// `{ code, detail }` body returned with HTTP 400.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error Code
    pub code: ErrorCode,
    /// Human readable description
    #[serde(default)]
    pub detail: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {}, detail: {}", self.code, self.detail)
    }
}

impl ErrorResponse {
    /// Create new [`ErrorResponse`]
    pub fn new(code: ErrorCode, detail: String) -> Self {
        Self { code, detail }
    }

    /// Error response from json
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;

        Self::from_value(value)
    }

    /// Error response from json [`Value`]
    ///
    /// A body that is not a well formed error response is preserved as the
    /// detail of an unknown code so that the message is not lost.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match serde_json::from_value::<ErrorResponse>(value.clone()) {
            Ok(res) => Ok(res),
            Err(_) => Ok(Self {
                code: ErrorCode::Unknown(999),
                detail: value.to_string(),
            }),
        }
    }
}
