//! Errors

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::wallet::{TokenId, WalletId};
use crate::{Amount, MintUrl};

/// Ledger Error
#[derive(Debug, Error)]
pub enum Error {
    /// No configured mint could quote the payment
    #[error("No mint available to quote the payment")]
    NoMintAvailable,
    /// No mint holds enough proofs to cover the quoted amount
    #[error("Insufficient proofs to cover the payment")]
    InsufficientProofs,
    /// Network or timeout error talking to a mint
    #[error("Mint transport error: `{0}`")]
    MintTransport(String),
    /// The mint may have processed a spend whose result never arrived
    #[error("Payment outcome at {mint_url} is unknown, verify before retrying")]
    AmbiguousOutcome {
        /// Mint the spend was sent to
        mint_url: MintUrl,
        /// Token records whose proofs were presented
        token_ids: Vec<TokenId>,
    },
    /// A replacement record could not be durably written
    #[error("Persistence failure: `{0}`")]
    PersistenceFailure(String),
    /// Mint reported the payment as failed
    #[error("Payment failed")]
    PaymentFailed,
    /// Error response returned by the mint
    #[error("Mint error: {0}")]
    MintResponse(ErrorResponse),
    /// Quote amount does not match the requested amount
    #[error("Quote amount {quoted} does not match requested amount {requested}")]
    IncorrectQuoteAmount {
        /// Requested
        requested: Amount,
        /// Quoted by the mint
        quoted: Amount,
    },
    /// Wallet is not known to the ledger
    #[error("Unknown wallet: {0}")]
    UnknownWallet(WalletId),
    /// Proof is already held in a live token record
    #[error("Proof is already held by this wallet")]
    DuplicateProof,
    /// Amount is zero
    #[error("Amount must be positive")]
    AmountZero,
    /// Token record without any proofs
    #[error("Token record has no proofs")]
    EmptyTokenRecord,
    /// Record could not be decoded
    #[error("Could not decode record: `{0}`")]
    Decode(String),
    /// Amount Error
    #[error(transparent)]
    Amount(#[from] crate::amount::Error),
    /// Url Error
    #[error(transparent)]
    MintUrl(#[from] crate::mint_url::Error),
    /// NUT00 Error
    #[error(transparent)]
    NUT00(#[from] crate::nuts::nut00::Error),
    /// NUT01 Error
    #[error(transparent)]
    NUT01(#[from] crate::nuts::nut01::Error),
    /// Database Error
    #[error(transparent)]
    Database(#[from] crate::database::Error),
    /// Serde Json error
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
    /// Custom Error
    #[error("`{0}`")]
    Custom(String),
}

impl Error {
    /// Failure reaching the mint, where the mint may not have seen the request
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::MintTransport(_))
    }

    /// Whether the caller must reconcile before spending again
    pub fn requires_verification(&self) -> bool {
        matches!(
            self,
            Error::AmbiguousOutcome { .. } | Error::PersistenceFailure(_)
        )
    }
}

/// Error Response
///
/// See NUT definition in [00](https://github.com/cashubtc/nuts/blob/main/00.md)
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

        Ok(Self::from_value(value))
    }

    /// Error response from json Value
    ///
    /// Bodies that are valid json but not an error response keep their content as detail.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value::<ErrorResponse>(value.clone()).unwrap_or_else(|_| Self {
            code: ErrorCode::Unknown(999),
            detail: value.to_string(),
        })
    }
}

impl From<ErrorResponse> for Error {
    fn from(err: ErrorResponse) -> Error {
        Error::MintResponse(err)
    }
}

/// Possible Error Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Proof verification failed (10001)
    TokenNotVerified,
    /// Proofs already spent (11001)
    TokenAlreadySpent,
    /// Proofs are pending (11002)
    TokenPending,
    /// Transaction is not balanced (11005)
    TransactionUnbalanced,
    /// Duplicate inputs provided (11007)
    DuplicateInputs,
    /// Amount in request does not equal invoice (11012)
    IncorrectQuoteAmount,
    /// Unit in request is not supported (11013)
    UnsupportedUnit,
    /// Keyset is not known (12001)
    KeysetNotFound,
    /// Keyset is inactive, cannot sign messages (12002)
    KeysetInactive,
    /// Lightning payment failed (20004)
    LightningError,
    /// Quote is pending (20005)
    QuotePending,
    /// Invoice already paid (20006)
    InvoiceAlreadyPaid,
    /// Quote is expired (20007)
    QuoteExpired,
    /// Unknown error code
    Unknown(u16),
}

impl ErrorCode {
    /// Error code from u16
    pub fn from_code(code: u16) -> Self {
        match code {
            10001 => Self::TokenNotVerified,
            11001 => Self::TokenAlreadySpent,
            11002 => Self::TokenPending,
            11005 => Self::TransactionUnbalanced,
            11007 => Self::DuplicateInputs,
            11012 => Self::IncorrectQuoteAmount,
            11013 => Self::UnsupportedUnit,
            12001 => Self::KeysetNotFound,
            12002 => Self::KeysetInactive,
            20004 => Self::LightningError,
            20005 => Self::QuotePending,
            20006 => Self::InvoiceAlreadyPaid,
            20007 => Self::QuoteExpired,
            _ => Self::Unknown(code),
        }
    }

    /// Error code to u16
    pub fn to_code(&self) -> u16 {
        match self {
            Self::TokenNotVerified => 10001,
            Self::TokenAlreadySpent => 11001,
            Self::TokenPending => 11002,
            Self::TransactionUnbalanced => 11005,
            Self::DuplicateInputs => 11007,
            Self::IncorrectQuoteAmount => 11012,
            Self::UnsupportedUnit => 11013,
            Self::KeysetNotFound => 12001,
            Self::KeysetInactive => 12002,
            Self::LightningError => 20004,
            Self::QuotePending => 20005,
            Self::InvoiceAlreadyPaid => 20006,
            Self::QuoteExpired => 20007,
            Self::Unknown(code) => *code,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(self.to_code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = u16::deserialize(deserializer)?;

        Ok(ErrorCode::from_code(code))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_code())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_error_response_from_json() {
        let response =
            ErrorResponse::from_json(r#"{"code":11001,"detail":"Token already spent"}"#).unwrap();
        assert_eq!(response.code, ErrorCode::TokenAlreadySpent);
        assert_eq!(response.detail, "Token already spent");
    }

    #[test]
    fn test_error_response_unknown_shape() {
        let response = ErrorResponse::from_json(r#"{"error":"bad gateway"}"#).unwrap();
        assert_eq!(response.code, ErrorCode::Unknown(999));
        assert!(response.detail.contains("bad gateway"));

        assert!(ErrorResponse::from_json("<html>502</html>").is_err());
    }

    #[test]
    fn test_error_code_roundtrip() {
        for code in [10001, 11001, 11002, 20004, 20007, 12345] {
            assert_eq!(ErrorCode::from_code(code).to_code(), code);
        }
    }

    #[test]
    fn test_ambiguous_outcome_is_labelled() {
        let err = Error::AmbiguousOutcome {
            mint_url: MintUrl::from_str("https://mint.example.com").unwrap(),
            token_ids: vec![],
        };
        assert!(err.to_string().contains("verify before retrying"));
        assert!(err.requires_verification());
        assert!(!Error::InsufficientProofs.requires_verification());
    }
}
