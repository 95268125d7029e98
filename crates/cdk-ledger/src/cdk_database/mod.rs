//! CDK Ledger Database

pub mod ledger_memory;

/// re-export types
pub use cdk_ledger_common::database::{Database, Error, RecordStream};
pub use ledger_memory::LedgerMemoryDatabase;
