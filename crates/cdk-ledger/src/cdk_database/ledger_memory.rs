//! Ledger in memory database

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use cdk_ledger_common::database::{Database, Error, RecordStream};
use cdk_ledger_common::{PaymentRecord, TokenId, TokenRecord, WalletId, WalletInfo};
use futures::stream;
use futures::StreamExt;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct RecordTable {
    seq_by_id: HashMap<TokenId, u64>,
    records: BTreeMap<u64, TokenRecord>,
    next_seq: u64,
}

/// Ledger in Memory Database
#[derive(Debug, Clone, Default)]
pub struct LedgerMemoryDatabase {
    wallets: Arc<RwLock<HashMap<WalletId, WalletInfo>>>,
    records: Arc<RwLock<RecordTable>>,
    payments: Arc<RwLock<Vec<PaymentRecord>>>,
}

impl LedgerMemoryDatabase {
    /// Create new [`LedgerMemoryDatabase`] holding `wallets` and `records`
    pub fn new(wallets: Vec<WalletInfo>, records: Vec<TokenRecord>) -> Self {
        let mut table = RecordTable::default();
        for record in records {
            table.seq_by_id.insert(record.id.clone(), table.next_seq);
            table.records.insert(table.next_seq, record);
            table.next_seq += 1;
        }

        Self {
            wallets: Arc::new(RwLock::new(
                wallets.into_iter().map(|w| (w.id.clone(), w)).collect(),
            )),
            records: Arc::new(RwLock::new(table)),
            payments: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Database for LedgerMemoryDatabase {
    async fn add_wallet(&self, wallet: WalletInfo) -> Result<(), Error> {
        self.wallets.write().await.insert(wallet.id.clone(), wallet);
        Ok(())
    }

    async fn get_wallet(&self, wallet_id: &WalletId) -> Result<Option<WalletInfo>, Error> {
        Ok(self.wallets.read().await.get(wallet_id).cloned())
    }

    async fn get_wallets(&self) -> Result<Vec<WalletInfo>, Error> {
        Ok(self.wallets.read().await.values().cloned().collect())
    }

    async fn publish_token_record(&self, record: TokenRecord) -> Result<(), Error> {
        let mut table = self.records.write().await;

        match table.seq_by_id.get(&record.id).copied() {
            Some(seq) => {
                table.records.insert(seq, record);
            }
            None => {
                let seq = table.next_seq;
                table.next_seq += 1;
                table.seq_by_id.insert(record.id.clone(), seq);
                table.records.insert(seq, record);
            }
        }

        Ok(())
    }

    async fn retire_token_record(&self, token_id: &TokenId) -> Result<(), Error> {
        let mut table = self.records.write().await;

        if let Some(seq) = table.seq_by_id.remove(token_id) {
            table.records.remove(&seq);
        }

        Ok(())
    }

    async fn get_token_record(&self, token_id: &TokenId) -> Result<Option<TokenRecord>, Error> {
        let table = self.records.read().await;

        Ok(table
            .seq_by_id
            .get(token_id)
            .and_then(|seq| table.records.get(seq))
            .cloned())
    }

    async fn fetch_wallet_records(&self, wallet_id: &WalletId) -> Result<RecordStream, Error> {
        let records: Vec<TokenRecord> = self
            .records
            .read()
            .await
            .records
            .values()
            .filter(|record| &record.wallet_id == wallet_id)
            .cloned()
            .collect();

        Ok(stream::iter(records.into_iter().map(Ok)).boxed())
    }

    async fn add_payment(&self, payment: PaymentRecord) -> Result<(), Error> {
        self.payments.write().await.push(payment);
        Ok(())
    }

    async fn get_payments(&self, wallet_id: &WalletId) -> Result<Vec<PaymentRecord>, Error> {
        Ok(self
            .payments
            .read()
            .await
            .iter()
            .filter(|payment| &payment.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}
