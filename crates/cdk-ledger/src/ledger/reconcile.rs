//! Reconciliation against the mint's spent state

use std::collections::HashSet;

use cdk_ledger_common::nuts::{CheckStateRequest, ProofsMethods, PublicKey, State};
use cdk_ledger_common::{Error, MintUrl, TokenId, TokenRecord, WalletId};
use tracing::instrument;

use super::settle::PendingSettlement;
use super::Ledger;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ReconcileOutcome {
    /// The record was replaced or retired
    pub changed: bool,
    /// The mint reports some of the record's proofs as pending
    pub pending: bool,
    /// Record now holding the unspent remainder
    pub replacement: Option<TokenId>,
}

impl ReconcileOutcome {
    /// Live record holding the proofs that were checked, if any
    fn live_token_id(&self, token_id: &TokenId) -> Option<TokenId> {
        if self.changed {
            self.replacement.clone()
        } else {
            Some(token_id.clone())
        }
    }
}

/// Record that could not be reconciled
#[derive(Debug)]
pub struct ReconcileFailure {
    /// Mint of the record
    pub mint_url: MintUrl,
    /// Record, or `None` when the mint's outstanding work could not be resolved
    pub token_id: Option<TokenId>,
    /// Cause
    pub error: Error,
}

/// Result of reconciling a whole wallet
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Records that were replaced or retired
    pub changed: Vec<TokenId>,
    /// Records the mints report as fully unspent
    pub unchanged: Vec<TokenId>,
    /// Failures, reconciliation continued past them
    pub failed: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    /// Whether every record was checked
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: ReconcileReport) {
        self.changed.extend(other.changed);
        self.unchanged.extend(other.unchanged);
        self.failed.extend(other.failed);
    }
}

impl Ledger {
    /// Check a record's proofs with its mint and drop the ones that are spent
    ///
    /// Returns `true` when the record was replaced by its unspent remainder, or retired when
    /// nothing is left. An unknown record is left alone and gives `false`.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, token_id: &TokenId) -> Result<bool, Error> {
        let record = self.store.read().get(token_id).cloned();
        let Some(record) = record else {
            tracing::debug!("Token record {} is not live", token_id);
            return Ok(false);
        };

        let ledger = self.clone();
        let token_id = token_id.clone();
        self.detached(async move {
            let TokenRecord {
                wallet_id,
                mint_url,
                ..
            } = record;
            let _guard = ledger.locks.lock(&wallet_id, &mint_url).await;

            ledger.resolve_settlements(&wallet_id, &mint_url).await?;

            let outcome = ledger.reconcile_locked(&token_id).await?;
            {
                let mut outstanding = ledger.outstanding.lock();
                let was_ambiguous = outstanding.clear_ambiguous(&wallet_id, &mint_url, &token_id);
                if was_ambiguous && outcome.pending {
                    outstanding.mark_ambiguous(
                        &wallet_id,
                        &mint_url,
                        outcome.live_token_id(&token_id),
                    );
                }
            }

            Ok(outcome.changed)
        })
        .await
    }

    /// Reconcile every live record of a wallet
    ///
    /// Outstanding work of each mint is resolved first. A failing mint or record is reported
    /// and the rest are still reconciled.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self, wallet_id: &WalletId) -> Result<ReconcileReport, Error> {
        let wallet = self.wallet_info(wallet_id)?;

        let mut mint_urls = wallet.mint_urls;
        let extra_mints = {
            let store_mints = self.store.read().mints(wallet_id);
            let mut extra = store_mints;
            extra.extend(self.outstanding.lock().mints(wallet_id));
            extra
        };
        for mint_url in extra_mints {
            if !mint_urls.contains(&mint_url) {
                mint_urls.push(mint_url);
            }
        }

        let mut report = ReconcileReport::default();
        for mint_url in mint_urls {
            let ledger = self.clone();
            let wallet_id = wallet_id.clone();
            let mint_report = self
                .detached(async move {
                    let _guard = ledger.locks.lock(&wallet_id, &mint_url).await;
                    Ok(ledger.reconcile_mint_locked(&wallet_id, &mint_url).await)
                })
                .await?;
            report.merge(mint_report);
        }

        tracing::info!(
            "Reconciled wallet {}: {} changed, {} unchanged, {} failed",
            wallet_id,
            report.changed.len(),
            report.unchanged.len(),
            report.failed.len()
        );

        Ok(report)
    }

    async fn reconcile_mint_locked(&self, wallet_id: &WalletId, mint_url: &MintUrl) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if let Err(err) = self.resolve_settlements(wallet_id, mint_url).await {
            report.failed.push(ReconcileFailure {
                mint_url: mint_url.clone(),
                token_id: None,
                error: err,
            });
            return report;
        }

        if let Err(err) = self.resolve_ambiguous(wallet_id, mint_url).await {
            tracing::warn!("Ambiguous spend at {} is unresolved: {}", mint_url, err);
            report.failed.push(ReconcileFailure {
                mint_url: mint_url.clone(),
                token_id: None,
                error: err,
            });
        }

        let token_ids: Vec<TokenId> = self
            .store
            .read()
            .records(wallet_id)
            .filter(|record| &record.mint_url == mint_url)
            .map(|record| record.id.clone())
            .collect();

        for token_id in token_ids {
            match self.reconcile_locked(&token_id).await {
                Ok(outcome) if outcome.changed => report.changed.push(token_id),
                Ok(_) => report.unchanged.push(token_id),
                Err(err) => {
                    tracing::warn!("Could not reconcile token record {}: {}", token_id, err);
                    report.failed.push(ReconcileFailure {
                        mint_url: mint_url.clone(),
                        token_id: Some(token_id),
                        error: err,
                    });
                }
            }
        }

        report
    }

    /// Reconcile one record
    ///
    /// Must be called while holding the lock of the record's mint, after its outstanding
    /// settlements are resolved.
    pub(crate) async fn reconcile_locked(&self, token_id: &TokenId) -> Result<ReconcileOutcome, Error> {
        let record = self.store.read().get(token_id).cloned();
        let Some(record) = record else {
            return Ok(ReconcileOutcome::default());
        };

        let ys = record.proofs.ys()?;
        let response = self
            .connector(&record.mint_url)
            .post_check_state(CheckStateRequest { ys })
            .await?;

        let pending = response
            .states
            .iter()
            .any(|state| state.state == State::Pending);
        let spent: HashSet<PublicKey> = response.spent_ys().copied().collect();

        if spent.is_empty() {
            return Ok(ReconcileOutcome {
                pending,
                ..Default::default()
            });
        }

        // Proofs added to the record while the mint was queried have not been checked and stay
        let current = self.store.read().get(token_id).cloned();
        let Some(current) = current else {
            return Ok(ReconcileOutcome {
                pending,
                ..Default::default()
            });
        };

        let mut spent_secrets = HashSet::new();
        for proof in &current.proofs {
            if spent.contains(&proof.y()?) {
                spent_secrets.insert(proof.secret.clone());
            }
        }

        tracing::info!(
            "Token record {} has {} spent proofs, {} remain",
            token_id,
            spent_secrets.len(),
            current.proofs.len() - spent_secrets.len()
        );

        let replacement = self
            .finish_settlement(
                &current.wallet_id,
                &current.mint_url,
                PendingSettlement::new(vec![token_id.clone()], spent_secrets, Vec::new(), None),
            )
            .await?;

        Ok(ReconcileOutcome {
            changed: true,
            pending,
            replacement,
        })
    }

    /// Reconcile records touched by a spend, keeping unresolved ones as ambiguous
    ///
    /// Must be called while holding the mint's lock.
    pub(crate) async fn reconcile_tokens_locked(
        &self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
        token_ids: &[TokenId],
    ) -> Result<(), Error> {
        let mut unresolved = Vec::new();
        let mut first_err = None;

        for token_id in token_ids {
            match self.reconcile_locked(token_id).await {
                Ok(outcome) if outcome.pending => {
                    // Pending proofs may have moved to a replacement record
                    unresolved.extend(outcome.live_token_id(token_id));
                }
                Ok(_) => (),
                Err(err) => {
                    tracing::warn!("Could not reconcile token record {}: {}", token_id, err);
                    // A failed write is already kept as an outstanding settlement
                    if !matches!(err, Error::PersistenceFailure(_)) {
                        unresolved.push(token_id.clone());
                    }
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }

        if unresolved.is_empty() {
            return match first_err {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        self.outstanding
            .lock()
            .mark_ambiguous(wallet_id, mint_url, unresolved.clone());

        Err(first_err.unwrap_or(Error::AmbiguousOutcome {
            mint_url: mint_url.clone(),
            token_ids: unresolved,
        }))
    }
}
