//! Proof selection
//!
//! First-fit accumulation over the proofs of one mint, in the order the [`ProofStore`] hands
//! them out. Proofs are taken until the target is covered. After that, the remaining proofs of
//! every token record that was touched are set aside to be moved into a replacement record.
//! Records that were never touched stay where they are.
//!
//! [`ProofStore`]: crate::proof_store::ProofStore

use std::collections::HashSet;

use cdk_ledger_common::{Amount, Error, Proof, Proofs, TokenId};
use tracing::instrument;

use crate::ensure_cdk;

/// Result of a successful selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofSelection {
    /// Proofs presented to the mint
    pub to_use: Proofs,
    /// Proofs of touched records that are not presented and move to the replacement record
    pub to_move: Proofs,
    /// Records touched by the selection, in the order they were first touched
    pub used_token_ids: Vec<TokenId>,
}

impl ProofSelection {
    /// Value presented to the mint
    pub fn use_amount(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(self.to_use.iter().map(|p| p.amount))?)
    }

    /// Value of proofs moving to the replacement record
    pub fn move_amount(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(self.to_move.iter().map(|p| p.amount))?)
    }
}

/// Select proofs covering `amount`
///
/// `proofs` is the ordered list from [`ProofStore::proofs_for_mint`]. Fails with
/// [`Error::InsufficientProofs`] when the whole list does not cover the amount. The input is
/// never modified.
///
/// [`ProofStore::proofs_for_mint`]: crate::proof_store::ProofStore::proofs_for_mint
#[instrument(skip(proofs), fields(available = proofs.len()))]
pub fn select_proofs(amount: Amount, proofs: &[(Proof, TokenId)]) -> Result<ProofSelection, Error> {
    ensure_cdk!(!amount.is_zero(), Error::AmountZero);

    let mut covered = Amount::ZERO;
    let mut to_use = Vec::new();
    let mut to_move = Vec::new();
    let mut used_token_ids: Vec<TokenId> = Vec::new();
    let mut touched: HashSet<&TokenId> = HashSet::new();

    for (proof, token_id) in proofs {
        if covered < amount {
            covered = covered
                .checked_add(proof.amount)
                .ok_or(cdk_ledger_common::amount::Error::AmountOverflow)?;
            to_use.push(proof.clone());
            if touched.insert(token_id) {
                used_token_ids.push(token_id.clone());
            }
        } else if touched.contains(token_id) {
            to_move.push(proof.clone());
        }
    }

    if covered < amount {
        tracing::debug!("Selection covers {} of {}", covered, amount);
        return Err(Error::InsufficientProofs);
    }

    Ok(ProofSelection {
        to_use,
        to_move,
        used_token_ids,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use cdk_ledger_common::dhke::hash_to_curve;
    use cdk_ledger_common::{Id, MintUrl, Secret, TokenRecord, WalletId};

    use super::*;
    use crate::proof_store::ProofStore;

    fn record(wallet_id: &WalletId, mint_url: &MintUrl, amounts: &[u64]) -> TokenRecord {
        let proofs = amounts
            .iter()
            .map(|amount| {
                let secret = Secret::generate();
                let c = hash_to_curve(secret.as_bytes()).unwrap();
                Proof::new(
                    Amount::from(*amount),
                    Id::from_str("00916bbf7ef91a36").unwrap(),
                    secret,
                    c,
                )
            })
            .collect();
        TokenRecord::new(wallet_id.clone(), mint_url.clone(), proofs)
    }

    fn amounts(proofs: &Proofs) -> Vec<u64> {
        proofs.iter().map(|p| p.amount.to_u64()).collect()
    }

    fn setup(records: &[&[u64]]) -> (ProofStore, WalletId, MintUrl, Vec<TokenId>) {
        let wallet_id = WalletId::generate();
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();
        let mut store = ProofStore::new();
        let mut ids = Vec::new();
        for amounts in records {
            let record = record(&wallet_id, &mint_url, amounts);
            ids.push(record.id.clone());
            store.upsert_token_record(record);
        }
        (store, wallet_id, mint_url, ids)
    }

    #[test]
    fn test_single_record_scenario() {
        let (store, wallet_id, mint_url, ids) = setup(&[&[1, 2, 4, 8]]);

        let selection =
            select_proofs(Amount::from(5), &store.proofs_for_mint(&wallet_id, &mint_url)).unwrap();

        assert_eq!(amounts(&selection.to_use), vec![1, 2, 4]);
        assert_eq!(amounts(&selection.to_move), vec![8]);
        assert_eq!(selection.used_token_ids, ids);
    }

    #[test]
    fn test_untouched_records_stay_in_place() {
        let (store, wallet_id, mint_url, ids) = setup(&[&[2, 1], &[4, 8], &[16]]);

        let selection =
            select_proofs(Amount::from(6), &store.proofs_for_mint(&wallet_id, &mint_url)).unwrap();

        assert_eq!(amounts(&selection.to_use), vec![2, 1, 4]);
        assert_eq!(amounts(&selection.to_move), vec![8]);
        assert_eq!(selection.used_token_ids, vec![ids[0].clone(), ids[1].clone()]);
    }

    #[test]
    fn test_exact_cover_moves_nothing() {
        let (store, wallet_id, mint_url, _) = setup(&[&[1, 2], &[4]]);

        let selection =
            select_proofs(Amount::from(3), &store.proofs_for_mint(&wallet_id, &mint_url)).unwrap();

        assert_eq!(amounts(&selection.to_use), vec![1, 2]);
        assert!(selection.to_move.is_empty());
        assert_eq!(selection.used_token_ids.len(), 1);
    }

    #[test]
    fn test_conservation_over_touched_records() {
        let (store, wallet_id, mint_url, _) = setup(&[&[1, 2, 4, 8], &[16, 32], &[64, 1, 1]]);
        let proofs = store.proofs_for_mint(&wallet_id, &mint_url);
        let total: u64 = proofs.iter().map(|(p, _)| p.amount.to_u64()).sum();

        for target in 1..=total {
            let selection = select_proofs(Amount::from(target), &proofs).unwrap();

            let touched_total: u64 = selection
                .used_token_ids
                .iter()
                .filter_map(|id| store.get(id))
                .flat_map(|record| record.proofs.iter())
                .map(|p| p.amount.to_u64())
                .sum();

            let used = selection.use_amount().unwrap().to_u64();
            let moved = selection.move_amount().unwrap().to_u64();
            assert!(used >= target);
            assert_eq!(used + moved, touched_total);
        }
    }

    #[test]
    fn test_infeasible_leaves_store_unchanged() {
        let (store, wallet_id, mint_url, _) = setup(&[&[1, 2], &[4]]);
        let before = store.clone();

        let result = select_proofs(Amount::from(8), &store.proofs_for_mint(&wallet_id, &mint_url));

        assert!(matches!(result, Err(Error::InsufficientProofs)));
        assert_eq!(store, before);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let (store, wallet_id, mint_url, _) = setup(&[&[8, 1], &[2, 4]]);

        let first =
            select_proofs(Amount::from(9), &store.proofs_for_mint(&wallet_id, &mint_url)).unwrap();
        let second =
            select_proofs(Amount::from(9), &store.proofs_for_mint(&wallet_id, &mint_url)).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_zero_amount_and_empty_list() {
        let (store, wallet_id, mint_url, _) = setup(&[&[1]]);
        let proofs = store.proofs_for_mint(&wallet_id, &mint_url);

        assert!(matches!(
            select_proofs(Amount::ZERO, &proofs),
            Err(Error::AmountZero)
        ));
        assert!(matches!(
            select_proofs(Amount::ONE, &[]),
            Err(Error::InsufficientProofs)
        ));
    }
}
