//! Proof store
//!
//! In-memory index of the live token records of every loaded wallet. Records keep the
//! position they were first added at, so proofs are always handed out in arrival order.
//! Nothing in here talks to a mint or to storage and no operation can fail.

use std::collections::{BTreeMap, HashMap};

use cdk_ledger_common::{Amount, MintUrl, Proof, Secret, TokenId, TokenRecord, WalletId};

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredRecord {
    record: TokenRecord,
    seq: u64,
}

/// Live token records grouped by wallet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofStore {
    records: HashMap<TokenId, StoredRecord>,
    by_wallet: HashMap<WalletId, BTreeMap<u64, TokenId>>,
    next_seq: u64,
}

impl ProofStore {
    /// Create new [`ProofStore`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, or replace the record with the same id in place
    pub fn upsert_token_record(&mut self, record: TokenRecord) {
        if let Some(stored) = self.records.get_mut(&record.id) {
            if stored.record.wallet_id != record.wallet_id {
                if let Some(index) = self.by_wallet.get_mut(&stored.record.wallet_id) {
                    index.remove(&stored.seq);
                }
                self.by_wallet
                    .entry(record.wallet_id.clone())
                    .or_default()
                    .insert(stored.seq, record.id.clone());
            }
            stored.record = record;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_wallet
            .entry(record.wallet_id.clone())
            .or_default()
            .insert(seq, record.id.clone());
        self.records
            .insert(record.id.clone(), StoredRecord { record, seq });
    }

    /// Remove a record from the live index
    pub fn retire_token_record(&mut self, token_id: &TokenId) -> Option<TokenRecord> {
        let stored = self.records.remove(token_id)?;

        if let Some(index) = self.by_wallet.get_mut(&stored.record.wallet_id) {
            index.remove(&stored.seq);
            if index.is_empty() {
                self.by_wallet.remove(&stored.record.wallet_id);
            }
        }

        Some(stored.record)
    }

    /// Get a live record
    pub fn get(&self, token_id: &TokenId) -> Option<&TokenRecord> {
        self.records.get(token_id).map(|stored| &stored.record)
    }

    /// Live records of a wallet in arrival order
    pub fn records<'a>(&'a self, wallet_id: &WalletId) -> impl Iterator<Item = &'a TokenRecord> {
        self.by_wallet
            .get(wallet_id)
            .into_iter()
            .flat_map(|index| index.values())
            .filter_map(|token_id| self.get(token_id))
    }

    /// Proofs of a wallet issued by one mint, with the record holding each
    ///
    /// Ordered by the arrival of their records, then by position inside the record.
    pub fn proofs_for_mint(&self, wallet_id: &WalletId, mint_url: &MintUrl) -> Vec<(Proof, TokenId)> {
        self.records(wallet_id)
            .filter(|record| &record.mint_url == mint_url)
            .flat_map(|record| {
                record
                    .proofs
                    .iter()
                    .map(|proof| (proof.clone(), record.id.clone()))
            })
            .collect()
    }

    /// Sum of all proofs across the wallet's live records
    pub fn balance(&self, wallet_id: &WalletId) -> Amount {
        self.records(wallet_id)
            .flat_map(|record| record.proofs.iter())
            .fold(Amount::ZERO, |acc, proof| acc.saturating_add(proof.amount))
    }

    /// Balance of a wallet per mint
    pub fn mint_balances(&self, wallet_id: &WalletId) -> BTreeMap<MintUrl, Amount> {
        let mut balances: BTreeMap<MintUrl, Amount> = BTreeMap::new();
        for record in self.records(wallet_id) {
            let balance = balances.entry(record.mint_url.clone()).or_default();
            for proof in &record.proofs {
                *balance = balance.saturating_add(proof.amount);
            }
        }
        balances
    }

    /// Whether a live record of the wallet holds a proof with this secret
    pub fn contains_secret(&self, wallet_id: &WalletId, secret: &Secret) -> bool {
        self.records(wallet_id)
            .any(|record| record.proofs.iter().any(|p| &p.secret == secret))
    }

    /// Mints the wallet holds records for
    pub fn mints(&self, wallet_id: &WalletId) -> Vec<MintUrl> {
        let mut mints: Vec<MintUrl> = Vec::new();
        for record in self.records(wallet_id) {
            if !mints.contains(&record.mint_url) {
                mints.push(record.mint_url.clone());
            }
        }
        mints
    }
}
