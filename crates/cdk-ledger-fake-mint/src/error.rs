//! Fake Mint Error

use cdk_ledger_common::{ErrorCode, ErrorResponse};
use thiserror::Error;

/// Fake Mint Error
#[derive(Debug, Error)]
pub enum Error {
    /// Invoice is not a fake invoice
    #[error("Invalid invoice")]
    InvalidInvoice,
    /// Quote id not issued by this mint
    #[error("Unknown quote")]
    UnknownQuote,
    /// Input already spent
    #[error("Token already spent")]
    TokenAlreadySpent,
    /// Input is in a pending melt
    #[error("Token pending")]
    TokenPending,
    /// Inputs do not cover the quote
    #[error("Inputs do not cover amount and fee reserve")]
    TransactionUnbalanced,
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<Error> for cdk_ledger_common::Error {
    fn from(err: Error) -> Self {
        let code = match err {
            Error::TokenAlreadySpent => ErrorCode::TokenAlreadySpent,
            Error::TokenPending => ErrorCode::TokenPending,
            Error::TransactionUnbalanced => ErrorCode::TransactionUnbalanced,
            Error::InvalidInvoice | Error::UnknownQuote | Error::Serde(_) => {
                ErrorCode::Unknown(20000)
            }
        };
        cdk_ledger_common::Error::MintResponse(ErrorResponse::new(code, err.to_string()))
    }
}
