//! Redb storage backend for the CDK proof ledger

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod error;
pub mod wallet;

pub use wallet::LedgerRedbDatabase;
