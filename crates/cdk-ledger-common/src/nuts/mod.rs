//! Nuts
//!
//! See all at <https://github.com/cashubtc/nuts>

pub mod nut00;
pub mod nut01;
pub mod nut02;
pub mod nut05;
pub mod nut07;

pub use nut00::{CurrencyUnit, Proof, Proofs, ProofsMethods};
pub use nut01::PublicKey;
pub use nut02::Id;
pub use nut05::{
    MeltQuoteBolt11Request, MeltQuoteBolt11Response, MeltRequest, QuoteState as MeltQuoteState,
};
pub use nut07::{CheckStateRequest, CheckStateResponse, ProofState, State};
