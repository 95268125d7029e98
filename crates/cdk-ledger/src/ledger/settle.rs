//! Settlement of replaced records and tracking of unresolved attempts
//!
//! A settlement replaces a set of consumed records with at most one replacement record. The
//! replacement is written first and the consumed records are retired only once it is durable.
//! Work that could not be completed is kept per (wallet, mint) and finished before that mint
//! is spent from again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;

use cdk_ledger_common::database;
use cdk_ledger_common::nuts::Proofs;
use cdk_ledger_common::util::unix_time;
use cdk_ledger_common::{Error, MintUrl, PaymentRecord, Secret, TokenId, TokenRecord, WalletId};

use super::Ledger;
use crate::proof_store::ProofStore;

type MintKey = (WalletId, MintUrl);

/// Replacement of consumed records that is not complete yet
///
/// Only what the mint decided is kept: which proofs are gone and which came back. The
/// replacement's proofs are taken from the consumed records as they are when it is written.
#[derive(Debug, Clone)]
pub(crate) struct PendingSettlement {
    /// Id the replacement is published under, stable across retries
    pub replacement_id: TokenId,
    pub replacement_persisted: bool,
    /// Whether a write of the replacement was started, so storage may hold it
    pub publish_attempted: bool,
    pub consumed: Vec<TokenId>,
    /// Secrets of consumed proofs that are spent at the mint
    pub spent: HashSet<Secret>,
    /// Proofs returned by the mint
    pub change: Proofs,
    pub payment: Option<PaymentRecord>,
}

impl PendingSettlement {
    pub(crate) fn new(
        consumed: Vec<TokenId>,
        spent: HashSet<Secret>,
        change: Proofs,
        payment: Option<PaymentRecord>,
    ) -> Self {
        Self {
            replacement_id: TokenId::generate(),
            replacement_persisted: false,
            publish_attempted: false,
            consumed,
            spent,
            change,
            payment,
        }
    }

    /// Unspent proofs of the consumed records followed by the change
    fn replacement_proofs(&self, store: &ProofStore) -> Proofs {
        let mut seen: HashSet<Secret> = HashSet::new();
        self.consumed
            .iter()
            .filter_map(|token_id| store.get(token_id))
            .flat_map(|record| record.proofs.iter())
            .filter(|proof| !self.spent.contains(&proof.secret))
            .chain(self.change.iter())
            .filter(|proof| seen.insert(proof.secret.clone()))
            .cloned()
            .collect()
    }

    fn replacement(
        &self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
        proofs: Proofs,
    ) -> Option<TokenRecord> {
        if proofs.is_empty() {
            return None;
        }
        Some(TokenRecord {
            id: self.replacement_id.clone(),
            wallet_id: wallet_id.clone(),
            mint_url: mint_url.clone(),
            proofs,
            created_at: unix_time(),
        })
    }
}

/// Work that has to be resolved before a wallet's mint is used again
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutstandingAttempt {
    /// A spend whose outcome at the mint is not known
    Ambiguous {
        /// Mint the spend was sent to
        mint_url: MintUrl,
        /// Records whose proofs were presented
        token_ids: Vec<TokenId>,
    },
    /// A settlement whose storage writes have not completed
    UnsettledPayment {
        /// Mint the records belong to
        mint_url: MintUrl,
        /// Records to retire
        consumed: Vec<TokenId>,
        /// Whether the replacement record is already durable
        replacement_persisted: bool,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Outstanding {
    ambiguous: HashMap<MintKey, BTreeSet<TokenId>>,
    settlements: HashMap<MintKey, Vec<PendingSettlement>>,
}

impl Outstanding {
    pub(crate) fn mark_ambiguous<I>(&mut self, wallet_id: &WalletId, mint_url: &MintUrl, token_ids: I)
    where
        I: IntoIterator<Item = TokenId>,
    {
        let entry = self
            .ambiguous
            .entry((wallet_id.clone(), mint_url.clone()))
            .or_default();
        entry.extend(token_ids);
        if entry.is_empty() {
            self.ambiguous.remove(&(wallet_id.clone(), mint_url.clone()));
        }
    }

    /// Drop a record from the ambiguous set, returning whether it was in it
    pub(crate) fn clear_ambiguous(
        &mut self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
        token_id: &TokenId,
    ) -> bool {
        let key = (wallet_id.clone(), mint_url.clone());
        let Some(token_ids) = self.ambiguous.get_mut(&key) else {
            return false;
        };
        let removed = token_ids.remove(token_id);
        if token_ids.is_empty() {
            self.ambiguous.remove(&key);
        }
        removed
    }

    fn take_ambiguous(&mut self, wallet_id: &WalletId, mint_url: &MintUrl) -> BTreeSet<TokenId> {
        self.ambiguous
            .remove(&(wallet_id.clone(), mint_url.clone()))
            .unwrap_or_default()
    }

    fn push_settlement(&mut self, wallet_id: &WalletId, mint_url: &MintUrl, settlement: PendingSettlement) {
        self.settlements
            .entry((wallet_id.clone(), mint_url.clone()))
            .or_default()
            .push(settlement);
    }

    fn take_settlements(&mut self, wallet_id: &WalletId, mint_url: &MintUrl) -> Vec<PendingSettlement> {
        self.settlements
            .remove(&(wallet_id.clone(), mint_url.clone()))
            .unwrap_or_default()
    }

    /// Mints of a wallet with unresolved work
    pub(crate) fn mints(&self, wallet_id: &WalletId) -> Vec<MintUrl> {
        let mut mints: Vec<MintUrl> = self
            .ambiguous
            .keys()
            .chain(self.settlements.keys())
            .filter(|(w, _)| w == wallet_id)
            .map(|(_, m)| m.clone())
            .collect();
        mints.sort();
        mints.dedup();
        mints
    }

    pub(crate) fn attempts(&self, wallet_id: &WalletId) -> Vec<OutstandingAttempt> {
        let mut attempts = Vec::new();

        for ((w, mint_url), token_ids) in &self.ambiguous {
            if w == wallet_id {
                attempts.push(OutstandingAttempt::Ambiguous {
                    mint_url: mint_url.clone(),
                    token_ids: token_ids.iter().cloned().collect(),
                });
            }
        }

        for ((w, mint_url), settlements) in &self.settlements {
            if w != wallet_id {
                continue;
            }
            for settlement in settlements {
                attempts.push(OutstandingAttempt::UnsettledPayment {
                    mint_url: mint_url.clone(),
                    consumed: settlement.consumed.clone(),
                    replacement_persisted: settlement.replacement_persisted,
                });
            }
        }

        attempts
    }
}

impl Ledger {
    /// Unresolved spends and settlements of a wallet
    pub fn outstanding(&self, wallet_id: &WalletId) -> Vec<OutstandingAttempt> {
        self.outstanding.lock().attempts(wallet_id)
    }

    /// Run a storage write, retrying with linear backoff
    pub(crate) async fn persist<F, Fut>(&self, what: &str, mut write: F) -> Result<(), Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), database::Error>>,
    {
        let attempts = self.config.persist_attempts.max(1);
        let mut attempt = 1;

        loop {
            match write().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        "Could not {} (attempt {}/{}): {}",
                        what,
                        attempt,
                        attempts,
                        err
                    );
                    tokio::time::sleep(self.config.persist_backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!("Could not {} after {} attempts: {}", what, attempts, err);
                    return Err(Error::PersistenceFailure(format!("{what}: {err}")));
                }
            }
        }
    }

    /// Write the replacement, switch the live view, then retire the consumed records
    ///
    /// Fails only when the replacement could not be written, in which case the consumed records
    /// stay live and the settlement is kept as outstanding. Records that could not be retired
    /// after the switch are kept as outstanding too, without failing.
    ///
    /// Returns the id of the replacement written by this call.
    pub(crate) async fn finish_settlement(
        &self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
        mut settlement: PendingSettlement,
    ) -> Result<Option<TokenId>, Error> {
        let mut written = None;

        if !settlement.replacement_persisted {
            let mut proofs = settlement.replacement_proofs(&self.store.read());

            // Republish under the same id until no proofs were added to the consumed records
            // while writing
            let replacement = loop {
                let replacement = settlement.replacement(wallet_id, mint_url, proofs.clone());

                let published = match &replacement {
                    Some(replacement) => {
                        settlement.publish_attempted = true;
                        self.persist("publish replacement record", || {
                            self.localstore.publish_token_record(replacement.clone())
                        })
                        .await
                    }
                    // Nothing is left, drop an earlier write of the replacement
                    None if settlement.publish_attempted => {
                        let replacement_id = settlement.replacement_id.clone();
                        self.persist("retire empty replacement record", || {
                            self.localstore.retire_token_record(&replacement_id)
                        })
                        .await
                    }
                    None => Ok(()),
                };

                if let Err(err) = published {
                    self.outstanding
                        .lock()
                        .push_settlement(wallet_id, mint_url, settlement);
                    return Err(err);
                }

                let switched = {
                    let mut store = self.store.write();
                    let current = settlement.replacement_proofs(&store);
                    if current == proofs {
                        if let Some(replacement) = &replacement {
                            store.upsert_token_record(replacement.clone());
                        }
                        for token_id in &settlement.consumed {
                            store.retire_token_record(token_id);
                        }
                        true
                    } else {
                        proofs = current;
                        false
                    }
                };

                if switched {
                    break replacement;
                }
                tracing::debug!("Consumed records changed while writing their replacement");
            };

            settlement.replacement_persisted = true;
            written = replacement.map(|record| record.id);

            if let Some(mut payment) = settlement.payment.take() {
                payment.replacement_token_id = written.clone();
                if let Err(err) = self
                    .persist("store payment record", || {
                        self.localstore.add_payment(payment.clone())
                    })
                    .await
                {
                    tracing::warn!("Payment {} settled without a payment record: {}", payment.id, err);
                }
            }
        }

        let mut unretired = Vec::new();
        for token_id in &settlement.consumed {
            if self
                .persist("retire token record", || {
                    self.localstore.retire_token_record(token_id)
                })
                .await
                .is_err()
            {
                unretired.push(token_id.clone());
            }
        }

        if !unretired.is_empty() {
            tracing::error!(
                "Replacement is durable but {} consumed records are not retired",
                unretired.len()
            );
            settlement.consumed = unretired;
            self.outstanding
                .lock()
                .push_settlement(wallet_id, mint_url, settlement);
        }

        Ok(written)
    }

    /// Finish settlements left over from earlier attempts
    ///
    /// Must be called while holding the mint's lock.
    pub(crate) async fn resolve_settlements(
        &self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
    ) -> Result<(), Error> {
        let settlements = self
            .outstanding
            .lock()
            .take_settlements(wallet_id, mint_url);

        let mut settlements = settlements.into_iter();
        while let Some(settlement) = settlements.next() {
            if let Err(err) = self.finish_settlement(wallet_id, mint_url, settlement).await {
                let mut outstanding = self.outstanding.lock();
                for rest in settlements {
                    outstanding.push_settlement(wallet_id, mint_url, rest);
                }
                return Err(err);
            }
        }

        Ok(())
    }

    /// Reconcile the records of ambiguous spends
    ///
    /// Must be called while holding the mint's lock.
    pub(crate) async fn resolve_ambiguous(
        &self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
    ) -> Result<(), Error> {
        let token_ids = self.outstanding.lock().take_ambiguous(wallet_id, mint_url);
        if token_ids.is_empty() {
            return Ok(());
        }

        tracing::info!(
            "Reconciling {} records of an earlier ambiguous spend at {}",
            token_ids.len(),
            mint_url
        );

        let token_ids: Vec<TokenId> = token_ids.into_iter().collect();
        self.reconcile_tokens_locked(wallet_id, mint_url, &token_ids)
            .await
    }

    /// Resolve everything outstanding for a wallet's mint
    ///
    /// Must be called while holding the mint's lock.
    pub(crate) async fn resolve_outstanding(
        &self,
        wallet_id: &WalletId,
        mint_url: &MintUrl,
    ) -> Result<(), Error> {
        self.resolve_settlements(wallet_id, mint_url).await?;
        self.resolve_ambiguous(wallet_id, mint_url).await
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_outstanding_view() {
        let wallet_id = WalletId::generate();
        let other_wallet = WalletId::generate();
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();
        let token_a = TokenId::generate();
        let token_b = TokenId::generate();

        let mut outstanding = Outstanding::default();
        outstanding.mark_ambiguous(&wallet_id, &mint_url, vec![token_a.clone()]);
        outstanding.mark_ambiguous(&wallet_id, &mint_url, vec![token_a.clone(), token_b.clone()]);
        outstanding.push_settlement(
            &wallet_id,
            &mint_url,
            PendingSettlement {
                replacement_persisted: true,
                ..PendingSettlement::new(vec![token_b.clone()], HashSet::new(), Vec::new(), None)
            },
        );

        let attempts = outstanding.attempts(&wallet_id);
        assert_eq!(attempts.len(), 2);
        assert!(attempts.contains(&OutstandingAttempt::UnsettledPayment {
            mint_url: mint_url.clone(),
            consumed: vec![token_b.clone()],
            replacement_persisted: true,
        }));
        assert!(outstanding.attempts(&other_wallet).is_empty());
        assert_eq!(outstanding.mints(&wallet_id), vec![mint_url.clone()]);

        assert!(outstanding.clear_ambiguous(&wallet_id, &mint_url, &token_a));
        assert!(outstanding.clear_ambiguous(&wallet_id, &mint_url, &token_b));
        assert!(!outstanding.clear_ambiguous(&wallet_id, &mint_url, &token_b));
        assert!(outstanding.take_ambiguous(&wallet_id, &mint_url).is_empty());

        assert_eq!(outstanding.take_settlements(&wallet_id, &mint_url).len(), 1);
        assert!(outstanding.mints(&wallet_id).is_empty());
    }

    #[test]
    fn test_empty_ambiguous_set_is_dropped() {
        let wallet_id = WalletId::generate();
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();

        let mut outstanding = Outstanding::default();
        outstanding.mark_ambiguous(&wallet_id, &mint_url, Vec::new());
        assert!(outstanding.attempts(&wallet_id).is_empty());
    }
}
