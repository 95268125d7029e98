//! Paying invoices
//!
//! A payment walks the wallet's mints in order: quote, select proofs, spend, settle. Quoting
//! and selection failures move on to the next mint. Once proofs have been presented to a mint
//! the payment is never retried elsewhere.

use std::collections::HashSet;

use cdk_ledger_common::nuts::{
    MeltQuoteBolt11Request, MeltQuoteBolt11Response, MeltQuoteState, MeltRequest, Proofs,
};
use cdk_ledger_common::util::unix_time;
use cdk_ledger_common::{Amount, Error, MintUrl, PaymentId, PaymentRecord, Secret, TokenId, WalletId};
use tracing::instrument;

use super::settle::PendingSettlement;
use super::Ledger;
use crate::ensure_cdk;
use crate::selection::{select_proofs, ProofSelection};

/// Outcome of a settled payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// Id of the stored payment record
    pub payment_id: PaymentId,
    /// Mint that paid the invoice
    pub mint_url: MintUrl,
    /// Melt quote id
    pub quote_id: String,
    /// Amount paid to the invoice
    pub amount: Amount,
    /// Fee kept by the mint
    pub fee_paid: Amount,
    /// Value of change returned by the mint
    pub change: Amount,
    /// Proof of payment
    pub preimage: Option<String>,
    /// Records consumed by the payment
    pub consumed_token_ids: Vec<TokenId>,
    /// Record holding leftovers and change
    pub replacement_token_id: Option<TokenId>,
}

#[derive(Debug)]
struct PaymentAttempt {
    wallet_id: WalletId,
    mint_url: MintUrl,
    invoice: String,
    quote: MeltQuoteBolt11Response,
    selection: ProofSelection,
}

fn sum(proofs: &Proofs) -> Amount {
    proofs
        .iter()
        .fold(Amount::ZERO, |acc, proof| acc.saturating_add(proof.amount))
}

impl Ledger {
    /// Pay `invoice` for `amount` from one of the wallet's mints
    ///
    /// Fails with [`Error::NoMintAvailable`] when no mint gives an acceptable quote and with
    /// [`Error::InsufficientProofs`] when no quoting mint holds enough proofs. An
    /// [`Error::AmbiguousOutcome`] means the mint may have spent the proofs: the records are
    /// reconciled before the next spend from that mint.
    #[instrument(skip(self, invoice))]
    pub async fn pay(
        &self,
        wallet_id: &WalletId,
        invoice: &str,
        amount: Amount,
    ) -> Result<PaymentResult, Error> {
        ensure_cdk!(!amount.is_zero(), Error::AmountZero);
        let wallet = self.wallet_info(wallet_id)?;

        let mut quoted = false;
        let mut rejected_quote = None;
        let mut unresolved = None;

        for mint_url in &wallet.mint_urls {
            let request = MeltQuoteBolt11Request {
                request: invoice.to_string(),
                unit: wallet.unit.clone(),
            };

            let quote = match self.connector(mint_url).post_melt_quote(request).await {
                Ok(quote) => quote,
                Err(err) => {
                    tracing::warn!("Could not get melt quote from {}: {}", mint_url, err);
                    continue;
                }
            };

            if quote.amount != amount {
                tracing::warn!(
                    "Mint {} quoted {} for an invoice of {}",
                    mint_url,
                    quote.amount,
                    amount
                );
                rejected_quote.get_or_insert(Error::IncorrectQuoteAmount {
                    requested: amount,
                    quoted: quote.amount,
                });
                continue;
            }
            quoted = true;

            let target = quote
                .amount_with_fee_reserve()
                .ok_or(cdk_ledger_common::amount::Error::AmountOverflow)?;

            let candidate =
                select_proofs(target, &self.store.read().proofs_for_mint(wallet_id, mint_url));
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(Error::InsufficientProofs) => {
                    tracing::debug!("Mint {} cannot cover {}", mint_url, target);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let guard = self.locks.lock(wallet_id, mint_url).await;

            let ledger = self.clone();
            let (w, m) = (wallet_id.clone(), mint_url.clone());
            let (guard, resolved) = self
                .detached(async move {
                    let resolved = ledger.resolve_outstanding(&w, &m).await;
                    Ok((guard, resolved))
                })
                .await?;

            if let Err(err) = resolved {
                tracing::warn!("Skipping {}, earlier attempt is unresolved: {}", mint_url, err);
                unresolved.get_or_insert(err);
                continue;
            }

            // The store may have changed while waiting for the lock
            let selection =
                select_proofs(target, &self.store.read().proofs_for_mint(wallet_id, mint_url));
            let selection = match selection {
                Ok(selection) => selection,
                Err(Error::InsufficientProofs) => {
                    tracing::debug!("Proofs at {} were spent while waiting", mint_url);
                    continue;
                }
                Err(err) => return Err(err),
            };
            if selection != candidate {
                tracing::debug!("Selection at {} changed while waiting", mint_url);
            }

            let attempt = PaymentAttempt {
                wallet_id: wallet_id.clone(),
                mint_url: mint_url.clone(),
                invoice: invoice.to_string(),
                quote,
                selection,
            };

            let ledger = self.clone();
            return self
                .detached(async move {
                    let _guard = guard;
                    ledger.execute_spend(attempt).await
                })
                .await;
        }

        if let Some(err) = unresolved {
            return Err(err);
        }
        if quoted {
            return Err(Error::InsufficientProofs);
        }
        Err(rejected_quote.unwrap_or(Error::NoMintAvailable))
    }

    /// Present the selected proofs to the mint
    ///
    /// Runs detached while holding the mint's lock.
    #[instrument(skip_all, fields(mint_url = %attempt.mint_url, quote = %attempt.quote.quote))]
    async fn execute_spend(&self, attempt: PaymentAttempt) -> Result<PaymentResult, Error> {
        let request = MeltRequest {
            quote: attempt.quote.quote.clone(),
            inputs: attempt.selection.to_use.clone(),
        };

        let response = self.connector(&attempt.mint_url).post_melt(request).await;

        match response {
            Ok(response) => match response.state {
                MeltQuoteState::Paid => self.settle(attempt, response).await,
                MeltQuoteState::Pending | MeltQuoteState::Unknown => {
                    tracing::error!(
                        "Melt of quote {} is {}, proofs may be spent",
                        attempt.quote.quote,
                        response.state
                    );
                    Err(self.mark_ambiguous(&attempt))
                }
                MeltQuoteState::Unpaid | MeltQuoteState::Failed => {
                    tracing::warn!("Melt of quote {} is {}", attempt.quote.quote, response.state);
                    self.reclaim(&attempt).await;
                    Err(Error::PaymentFailed)
                }
            },
            Err(Error::MintResponse(err)) => {
                tracing::warn!("Mint rejected melt of quote {}: {}", attempt.quote.quote, err);
                self.reclaim(&attempt).await;
                Err(Error::MintResponse(err))
            }
            Err(err) => {
                tracing::error!(
                    "Melt of quote {} has unknown outcome: {}",
                    attempt.quote.quote,
                    err
                );
                Err(self.mark_ambiguous(&attempt))
            }
        }
    }

    fn mark_ambiguous(&self, attempt: &PaymentAttempt) -> Error {
        let token_ids = attempt.selection.used_token_ids.clone();
        self.outstanding.lock().mark_ambiguous(
            &attempt.wallet_id,
            &attempt.mint_url,
            token_ids.clone(),
        );

        Error::AmbiguousOutcome {
            mint_url: attempt.mint_url.clone(),
            token_ids,
        }
    }

    /// Bring the touched records in line with the mint after a failed spend
    async fn reclaim(&self, attempt: &PaymentAttempt) {
        if let Err(err) = self
            .reconcile_tokens_locked(
                &attempt.wallet_id,
                &attempt.mint_url,
                &attempt.selection.used_token_ids,
            )
            .await
        {
            tracing::warn!("Could not reconcile records after failed payment: {}", err);
        }
    }

    /// Replace the consumed records with leftovers and change
    async fn settle(
        &self,
        attempt: PaymentAttempt,
        response: MeltQuoteBolt11Response,
    ) -> Result<PaymentResult, Error> {
        let PaymentAttempt {
            wallet_id,
            mint_url,
            invoice,
            quote,
            selection,
        } = attempt;

        let change = response.change.unwrap_or_default();
        let change_amount = sum(&change);
        let inputs_amount = sum(&selection.to_use);
        let fee_paid = inputs_amount
            .saturating_sub(quote.amount)
            .saturating_sub(change_amount);

        let spent: HashSet<Secret> = selection
            .to_use
            .iter()
            .map(|proof| proof.secret.clone())
            .collect();

        // The replacement id is filled in once the replacement is written
        let payment = PaymentRecord {
            id: PaymentId::generate(),
            wallet_id: wallet_id.clone(),
            mint_url: mint_url.clone(),
            invoice,
            quote_id: quote.quote.clone(),
            amount: quote.amount,
            fee_paid,
            change: change_amount,
            consumed_token_ids: selection.used_token_ids.clone(),
            replacement_token_id: None,
            preimage: response.payment_preimage.clone(),
            timestamp: unix_time(),
        };
        let payment_id = payment.id.clone();

        // Leftovers come from the records as they are when the replacement is written, not as
        // they were selected
        let replacement_token_id = self
            .finish_settlement(
                &wallet_id,
                &mint_url,
                PendingSettlement::new(
                    selection.used_token_ids.clone(),
                    spent,
                    change,
                    Some(payment),
                ),
            )
            .await?;

        let result = PaymentResult {
            payment_id,
            mint_url: mint_url.clone(),
            quote_id: quote.quote,
            amount: quote.amount,
            fee_paid,
            change: change_amount,
            preimage: response.payment_preimage,
            consumed_token_ids: selection.used_token_ids,
            replacement_token_id,
        };

        tracing::info!(
            "Paid {} from {} with fee {} and change {}",
            result.amount,
            mint_url,
            result.fee_paid,
            result.change
        );

        Ok(result)
    }
}
