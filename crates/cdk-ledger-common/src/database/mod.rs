//! Persistence gateway
//!
//! Durable storage for wallets, token records and payment records. Publishing and retiring
//! are idempotent: publishing the same record twice, or retiring an id that is already gone,
//! succeeds without changing anything.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::wallet::{PaymentRecord, TokenId, TokenRecord, WalletId, WalletInfo};


/// Database Error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database Error
    #[error(transparent)]
    Database(Box<dyn std::error::Error + Send + Sync>),
    /// Serde Error
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// Storage is currently unavailable
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Stream of token records in arrival order
pub type RecordStream = BoxStream<'static, Result<TokenRecord, Error>>;

/// Ledger Database trait
#[async_trait]
pub trait Database: Debug {
    /// Add or replace a wallet
    async fn add_wallet(&self, wallet: WalletInfo) -> Result<(), Error>;

    /// Get wallet
    async fn get_wallet(&self, wallet_id: &WalletId) -> Result<Option<WalletInfo>, Error>;

    /// Get all wallets
    async fn get_wallets(&self) -> Result<Vec<WalletInfo>, Error>;

    /// Publish a token record
    ///
    /// A record with an existing id replaces it and keeps its arrival position.
    async fn publish_token_record(&self, record: TokenRecord) -> Result<(), Error>;

    /// Retire a token record
    async fn retire_token_record(&self, token_id: &TokenId) -> Result<(), Error>;

    /// Get a live token record
    async fn get_token_record(&self, token_id: &TokenId) -> Result<Option<TokenRecord>, Error>;

    /// Stream the live token records of a wallet in arrival order
    ///
    /// Records that fail to decode are yielded as errors so the caller can skip them.
    async fn fetch_wallet_records(&self, wallet_id: &WalletId) -> Result<RecordStream, Error>;

    /// Add payment record
    async fn add_payment(&self, payment: PaymentRecord) -> Result<(), Error>;

    /// List payment records of a wallet, oldest first
    async fn get_payments(&self, wallet_id: &WalletId) -> Result<Vec<PaymentRecord>, Error>;
}
