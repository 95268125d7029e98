//! Mint connectors

pub mod http_client;

pub use cdk_ledger_common::MintConnector;
pub use http_client::HttpClient;
