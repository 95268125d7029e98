//! CDK Ledger Fake Mint
//!
//! Used for testing the ledger engine where the mint's answers are scripted. The behaviour of a
//! payment is carried by the invoice itself (see [`FakeInvoice`]), while mint wide knobs such as
//! the fee reserve, latency and reachability are set on the [`FakeMint`].

#![doc = include_str!("../README.md")]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdk_ledger_common::dhke::hash_to_curve;
use cdk_ledger_common::nuts::{
    CheckStateRequest, CheckStateResponse, Id, MeltQuoteBolt11Request, MeltQuoteBolt11Response,
    MeltQuoteState, MeltRequest, Proof, ProofState, Proofs, ProofsMethods, PublicKey, State,
};
use cdk_ledger_common::util::unix_time;
use cdk_ledger_common::{Amount, MintConnector, Secret};
use error::Error;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

pub mod error;

const INVOICE_PREFIX: &str = "lnfake";

/// Keyset id used for proofs issued by the fake mint
pub const FAKE_KEYSET_ID: &str = "00916bbf7ef91a36";

/// Scripted behaviour of a fake invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeInvoiceDescription {
    /// State returned when the invoice is paid
    pub pay_invoice_state: MeltQuoteState,
    /// Amounts of change proofs returned on success
    #[serde(default)]
    pub change: Vec<u64>,
    /// Amount the quote reports, when it should differ from the invoice
    #[serde(default)]
    pub quote_amount: Option<u64>,
    /// Quote request fails with a transport error
    #[serde(default)]
    pub quote_err: bool,
    /// Melt request fails with a transport error before the mint sees it
    #[serde(default)]
    pub pay_err: bool,
    /// Melt is processed but the response is lost
    #[serde(default)]
    pub lose_response: bool,
}

impl Default for FakeInvoiceDescription {
    fn default() -> Self {
        Self {
            pay_invoice_state: MeltQuoteState::Paid,
            change: vec![],
            quote_amount: None,
            quote_err: false,
            pay_err: false,
            lose_response: false,
        }
    }
}

/// Fake invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeInvoice {
    /// Invoice id, so equal amounts still give distinct invoices
    pub id: String,
    /// Amount to pay
    pub amount: u64,
    /// Behaviour
    #[serde(default)]
    pub description: FakeInvoiceDescription,
}

impl FakeInvoice {
    /// New invoice that pays successfully without change
    pub fn new(amount: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            description: FakeInvoiceDescription::default(),
        }
    }

    /// Mint returns change proofs of these amounts
    pub fn with_change(mut self, change: Vec<u64>) -> Self {
        self.description.change = change;
        self
    }

    /// Mint reports this state for the payment
    pub fn with_state(mut self, state: MeltQuoteState) -> Self {
        self.description.pay_invoice_state = state;
        self
    }

    /// Quote reports a different amount than the invoice
    pub fn with_quote_amount(mut self, amount: u64) -> Self {
        self.description.quote_amount = Some(amount);
        self
    }

    /// Quote request fails in transport
    pub fn quote_err(mut self) -> Self {
        self.description.quote_err = true;
        self
    }

    /// Melt request fails in transport before reaching the mint
    pub fn pay_err(mut self) -> Self {
        self.description.pay_err = true;
        self
    }

    /// Melt is processed but its response never arrives
    pub fn lose_response(mut self) -> Self {
        self.description.lose_response = true;
        self
    }
}

impl fmt::Display for FakeInvoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{INVOICE_PREFIX}{json}")
    }
}

impl FromStr for FakeInvoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let json = s.strip_prefix(INVOICE_PREFIX).ok_or(Error::InvalidInvoice)?;
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Default)]
struct MintState {
    quotes: HashMap<String, (MeltQuoteBolt11Response, FakeInvoiceDescription)>,
    spent: HashSet<PublicKey>,
    pending: HashSet<PublicKey>,
}

/// Fake Mint
#[derive(Debug, Clone)]
pub struct FakeMint {
    fee_reserve: Amount,
    state: Arc<Mutex<MintState>>,
    melt_delay: Arc<Mutex<Option<Duration>>>,
    unreachable: Arc<AtomicBool>,
    check_state_err: Arc<AtomicBool>,
    quote_calls: Arc<AtomicUsize>,
    melt_calls: Arc<AtomicUsize>,
    check_state_calls: Arc<AtomicUsize>,
}

impl Default for FakeMint {
    fn default() -> Self {
        Self::new(Amount::ZERO)
    }
}

impl FakeMint {
    /// Create new [`FakeMint`] charging `fee_reserve` on every quote
    pub fn new(fee_reserve: Amount) -> Self {
        Self {
            fee_reserve,
            state: Arc::new(Mutex::new(MintState::default())),
            melt_delay: Arc::new(Mutex::new(None)),
            unreachable: Arc::new(AtomicBool::new(false)),
            check_state_err: Arc::new(AtomicBool::new(false)),
            quote_calls: Arc::new(AtomicUsize::new(0)),
            melt_calls: Arc::new(AtomicUsize::new(0)),
            check_state_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Issue fresh proofs of the given amounts
    pub fn issue(&self, amounts: &[u64]) -> Proofs {
        amounts
            .iter()
            .filter_map(|amount| self.new_proof(*amount))
            .collect()
    }

    fn new_proof(&self, amount: u64) -> Option<Proof> {
        let keyset_id = Id::from_str(FAKE_KEYSET_ID).ok()?;
        let secret = Secret::generate();
        // Not a real signature; any valid point will do for the ledger
        let c = hash_to_curve(format!("fake-signature-{secret}").as_bytes()).ok()?;
        Some(Proof::new(Amount::from(amount), keyset_id, secret, c))
    }

    /// Delay every melt by `delay` before it is processed
    pub async fn set_melt_delay(&self, delay: Option<Duration>) {
        *self.melt_delay.lock().await = delay;
    }

    /// Make every request fail with a transport error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make state checks fail with a transport error
    pub fn set_check_state_err(&self, err: bool) {
        self.check_state_err.store(err, Ordering::SeqCst);
    }

    /// Mark proofs as spent, as if another wallet redeemed them
    pub async fn mark_spent(&self, proofs: &Proofs) {
        let ys = proofs.ys().unwrap_or_default();
        let mut state = self.state.lock().await;
        state.spent.extend(ys);
    }

    /// Resolve every pending melt, spending its inputs when `paid`
    pub async fn complete_pending(&self, paid: bool) {
        let mut state = self.state.lock().await;
        let pending: Vec<PublicKey> = state.pending.drain().collect();
        if paid {
            state.spent.extend(pending);
        }
    }

    /// Whether the mint considers a proof spent
    pub async fn is_spent(&self, proof: &Proof) -> bool {
        match proof.y() {
            Ok(y) => self.state.lock().await.spent.contains(&y),
            Err(_) => false,
        }
    }

    /// Number of melt quote requests received
    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    /// Number of melt requests received
    pub fn melt_calls(&self) -> usize {
        self.melt_calls.load(Ordering::SeqCst)
    }

    /// Number of state checks received
    pub fn check_state_calls(&self) -> usize {
        self.check_state_calls.load(Ordering::SeqCst)
    }

    fn ensure_reachable(&self) -> Result<(), cdk_ledger_common::Error> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(cdk_ledger_common::Error::MintTransport(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MintConnector for FakeMint {
    #[instrument(skip_all)]
    async fn post_melt_quote(
        &self,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, cdk_ledger_common::Error> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable()?;

        let invoice = FakeInvoice::from_str(&request.request)?;
        if invoice.description.quote_err {
            return Err(cdk_ledger_common::Error::MintTransport(
                "quote request timed out".to_string(),
            ));
        }

        let quote = MeltQuoteBolt11Response {
            quote: Uuid::new_v4().to_string(),
            amount: Amount::from(invoice.description.quote_amount.unwrap_or(invoice.amount)),
            fee_reserve: self.fee_reserve,
            state: MeltQuoteState::Unpaid,
            expiry: unix_time() + 600,
            payment_preimage: None,
            change: None,
        };

        self.state
            .lock()
            .await
            .quotes
            .insert(quote.quote.clone(), (quote.clone(), invoice.description));

        Ok(quote)
    }

    #[instrument(skip_all, fields(quote = %request.quote))]
    async fn post_melt(
        &self,
        request: MeltRequest,
    ) -> Result<MeltQuoteBolt11Response, cdk_ledger_common::Error> {
        self.melt_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable()?;

        let delay = *self.melt_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        let (mut quote, description) = state
            .quotes
            .get(&request.quote)
            .cloned()
            .ok_or(Error::UnknownQuote)?;

        if description.pay_err {
            return Err(cdk_ledger_common::Error::MintTransport(
                "connection reset by peer".to_string(),
            ));
        }

        let ys = request.inputs.ys()?;
        if ys.iter().any(|y| state.spent.contains(y)) {
            return Err(Error::TokenAlreadySpent.into());
        }
        if ys.iter().any(|y| state.pending.contains(y)) {
            return Err(Error::TokenPending.into());
        }

        let inputs_total = request.inputs.total_amount()?;
        let needed = quote
            .amount_with_fee_reserve()
            .ok_or(cdk_ledger_common::amount::Error::AmountOverflow)?;
        if inputs_total < needed {
            return Err(Error::TransactionUnbalanced.into());
        }

        quote.state = description.pay_invoice_state;
        match description.pay_invoice_state {
            MeltQuoteState::Paid => {
                state.spent.extend(ys);
                quote.payment_preimage = Some(format!("preimage-{}", quote.quote));
                quote.change = Some(
                    description
                        .change
                        .iter()
                        .filter_map(|amount| self.new_proof(*amount))
                        .collect(),
                );
            }
            MeltQuoteState::Pending => {
                state.pending.extend(ys);
            }
            MeltQuoteState::Unpaid | MeltQuoteState::Failed | MeltQuoteState::Unknown => {}
        }

        tracing::debug!("Fake melt for quote {} is {}", quote.quote, quote.state);

        if description.lose_response {
            return Err(cdk_ledger_common::Error::MintTransport(
                "response lost".to_string(),
            ));
        }

        Ok(quote)
    }

    #[instrument(skip_all)]
    async fn post_check_state(
        &self,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, cdk_ledger_common::Error> {
        self.check_state_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable()?;

        if self.check_state_err.load(Ordering::SeqCst) {
            return Err(cdk_ledger_common::Error::MintTransport(
                "check state timed out".to_string(),
            ));
        }

        let state = self.state.lock().await;
        let states = request
            .ys
            .into_iter()
            .map(|y| {
                let proof_state = if state.spent.contains(&y) {
                    State::Spent
                } else if state.pending.contains(&y) {
                    State::Pending
                } else {
                    State::Unspent
                };
                ProofState {
                    y,
                    state: proof_state,
                    witness: None,
                }
            })
            .collect();

        Ok(CheckStateResponse { states })
    }
}
