//! Ledger engine
//!
//! The [`Ledger`] is the only component that mutates the [`ProofStore`] or talks to mints and
//! storage. Spending from a mint, and everything that replaces or retires records of that mint,
//! happens while holding the lock of the (wallet, mint) pair. Steps that must not be abandoned
//! half way once started run on a detached task that owns the lock, so dropping the caller's
//! future cannot leave a spend or a settlement unfinished.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cdk_ledger_common::database::Database;
use cdk_ledger_common::{
    Amount, Error, MintConnector, MintUrl, PaymentRecord, TokenId, TokenRecord, WalletId,
    WalletInfo,
};
use parking_lot::{Mutex, RwLock};
use tracing::instrument;

use crate::mint_connector::HttpClient;
use crate::proof_store::ProofStore;

mod builder;
mod locks;
mod pay;
mod receive;
mod reconcile;
mod settle;
mod wallets;

pub use builder::LedgerBuilder;
pub use pay::PaymentResult;
pub use reconcile::{ReconcileFailure, ReconcileReport};
pub use settle::OutstandingAttempt;

use self::locks::MintLocks;
use self::settle::Outstanding;

/// Default number of attempts for a storage write
pub const DEFAULT_PERSIST_ATTEMPTS: u32 = 5;
/// Default backoff step between storage write attempts
pub const DEFAULT_PERSIST_BACKOFF: Duration = Duration::from_millis(250);
/// Default timeout for requests to a mint
pub const DEFAULT_MINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ledger settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Attempts made for every storage write before giving up
    pub persist_attempts: u32,
    /// Backoff step between attempts, growing linearly
    pub persist_backoff: Duration,
    /// Timeout of a request to a mint made through the default [`HttpClient`]
    pub mint_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            persist_attempts: DEFAULT_PERSIST_ATTEMPTS,
            persist_backoff: DEFAULT_PERSIST_BACKOFF,
            mint_timeout: DEFAULT_MINT_TIMEOUT,
        }
    }
}

/// Proof ledger and payment engine
#[derive(Debug, Clone)]
pub struct Ledger {
    localstore: Arc<dyn Database + Send + Sync>,
    store: Arc<RwLock<ProofStore>>,
    wallets: Arc<RwLock<HashMap<WalletId, WalletInfo>>>,
    connectors: Arc<RwLock<HashMap<MintUrl, Arc<dyn MintConnector + Send + Sync>>>>,
    locks: Arc<MintLocks>,
    outstanding: Arc<Mutex<Outstanding>>,
    config: LedgerConfig,
}

impl Ledger {
    fn new(
        localstore: Arc<dyn Database + Send + Sync>,
        connectors: HashMap<MintUrl, Arc<dyn MintConnector + Send + Sync>>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            localstore,
            store: Arc::new(RwLock::new(ProofStore::new())),
            wallets: Arc::new(RwLock::new(HashMap::new())),
            connectors: Arc::new(RwLock::new(connectors)),
            locks: Arc::new(MintLocks::default()),
            outstanding: Arc::new(Mutex::new(Outstanding::default())),
            config,
        }
    }

    /// Ledger settings
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Connector of a mint, an [`HttpClient`] unless one was configured
    pub fn connector(&self, mint_url: &MintUrl) -> Arc<dyn MintConnector + Send + Sync> {
        if let Some(connector) = self.connectors.read().get(mint_url) {
            return connector.clone();
        }

        self.connectors
            .write()
            .entry(mint_url.clone())
            .or_insert_with(|| {
                Arc::new(HttpClient::with_timeout(
                    mint_url.clone(),
                    self.config.mint_timeout,
                ))
            })
            .clone()
    }

    /// Wallet balance, derived from its live token records
    pub fn balance(&self, wallet_id: &WalletId) -> Amount {
        self.store.read().balance(wallet_id)
    }

    /// Wallet balance per mint
    pub fn mint_balances(&self, wallet_id: &WalletId) -> BTreeMap<MintUrl, Amount> {
        self.store.read().mint_balances(wallet_id)
    }

    /// Live token records of a wallet in arrival order
    pub fn token_records(&self, wallet_id: &WalletId) -> Vec<TokenRecord> {
        self.store.read().records(wallet_id).cloned().collect()
    }

    /// Live token record
    pub fn token_record(&self, token_id: &TokenId) -> Option<TokenRecord> {
        self.store.read().get(token_id).cloned()
    }

    /// Payments made by a wallet, oldest first
    #[instrument(skip(self))]
    pub async fn payments(&self, wallet_id: &WalletId) -> Result<Vec<PaymentRecord>, Error> {
        Ok(self.localstore.get_payments(wallet_id).await?)
    }

    fn wallet_info(&self, wallet_id: &WalletId) -> Result<WalletInfo, Error> {
        self.wallets
            .read()
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| Error::UnknownWallet(wallet_id.clone()))
    }

    /// Run `future` on its own task so it completes even if the caller is dropped
    async fn detached<F, T>(&self, future: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        tokio::spawn(future)
            .await
            .map_err(|err| Error::Custom(format!("Ledger task failed: {err}")))?
    }
}
