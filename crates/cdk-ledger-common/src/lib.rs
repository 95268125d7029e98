//! CDK ledger common types and traits
//!
//! Proofs, token records, wallets and the two collaborators the ledger engine talks to: the
//! [`MintConnector`] and the persistence [`Database`].

pub mod amount;
pub mod database;
pub mod dhke;
pub mod error;
pub mod mint_connector;
pub mod mint_url;
pub mod nuts;
pub mod secret;
pub mod util;
pub mod wallet;

pub use self::amount::Amount;
pub use self::database::Database;
pub use self::error::{Error, ErrorCode, ErrorResponse};
pub use self::mint_connector::MintConnector;
pub use self::mint_url::MintUrl;
pub use self::nuts::*;
pub use self::secret::Secret;
pub use self::wallet::{
    PaymentId, PaymentRecord, RecordUpdate, TokenId, TokenRecord, WalletId, WalletInfo,
};
