//! Local e-cash proof ledger and payment engine
#![doc = include_str!("../README.md")]

pub mod cdk_database;
pub mod ledger;
pub mod mint_connector;
pub mod proof_store;
pub mod selection;

/// Re-export common types
#[doc(hidden)]
pub use cdk_ledger_common::{
    amount, database, dhke, ensure_cdk,
    error::{self, Error},
    mint_url, nuts, secret, util, wallet, Amount, Database, MintConnector, MintUrl, PaymentId,
    PaymentRecord, RecordUpdate, TokenId, TokenRecord, WalletId, WalletInfo,
};

#[doc(hidden)]
pub use self::cdk_database::LedgerMemoryDatabase;
#[doc(hidden)]
pub use self::ledger::{
    Ledger, LedgerBuilder, LedgerConfig, OutstandingAttempt, PaymentResult, ReconcileFailure,
    ReconcileReport,
};
#[doc(hidden)]
pub use self::mint_connector::HttpClient;
#[doc(hidden)]
pub use self::proof_store::ProofStore;
#[doc(hidden)]
pub use self::selection::{select_proofs, ProofSelection};

/// Re-export futures::Stream
pub use futures::{Stream, StreamExt};
