//! Mint connector
//!
//! The ledger's view of a remote mint. Every call may fail with [`Error::MintTransport`]; what
//! that means depends on the phase the engine is in.
//!
//! [`Error::MintTransport`]: crate::Error::MintTransport

use std::fmt::Debug;

use async_trait::async_trait;

use crate::nuts::{
    CheckStateRequest, CheckStateResponse, MeltQuoteBolt11Request, MeltQuoteBolt11Response,
    MeltRequest,
};
use crate::Error;

/// Interface that connects the ledger to a mint
#[async_trait]
pub trait MintConnector: Debug {
    /// Melt Quote [NUT-05]
    async fn post_melt_quote(
        &self,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error>;
    /// Melt [NUT-05]
    ///
    /// Destructive at the mint: the inputs may be consumed even when no response arrives.
    async fn post_melt(&self, request: MeltRequest) -> Result<MeltQuoteBolt11Response, Error>;
    /// Spendable check [NUT-07]
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error>;
}
