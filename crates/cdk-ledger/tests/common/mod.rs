//! Shared helpers for the ledger integration tests
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdk_ledger::cdk_database::{Database, Error, LedgerMemoryDatabase, RecordStream};
use cdk_ledger::nuts::{CurrencyUnit, Proof, ProofsMethods};
use cdk_ledger::{
    Amount, Ledger, LedgerBuilder, MintUrl, PaymentRecord, TokenId, TokenRecord, WalletId,
    WalletInfo,
};
use cdk_ledger_fake_mint::FakeMint;
use futures::{stream, StreamExt};

/// Mint url for a test host
pub fn mint_url(name: &str) -> MintUrl {
    MintUrl::from_str(&format!("https://{name}.example.com")).unwrap()
}

/// Amounts of a list of proofs
pub fn amounts<'a, I>(proofs: I) -> Vec<u64>
where
    I: IntoIterator<Item = &'a Proof>,
{
    proofs.into_iter().map(|p| p.amount.to_u64()).collect()
}

/// Amounts of each live record of the wallet, in arrival order
pub fn record_amounts(ledger: &Ledger, wallet_id: &WalletId) -> Vec<Vec<u64>> {
    ledger
        .token_records(wallet_id)
        .iter()
        .map(|record| amounts(&record.proofs))
        .collect()
}

/// Memory database whose writes can be made to fail
#[derive(Debug, Clone, Default)]
pub struct FlakyDatabase {
    pub inner: LedgerMemoryDatabase,
    fail_publish: Arc<AtomicBool>,
    fail_retire: Arc<AtomicBool>,
    transient_publish_failures: Arc<AtomicUsize>,
    corrupt_records: Arc<AtomicBool>,
    publish_calls: Arc<AtomicUsize>,
}

impl FlakyDatabase {
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_retire(&self, fail: bool) {
        self.fail_retire.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` publishes, then recover
    pub fn fail_next_publishes(&self, count: usize) {
        self.transient_publish_failures
            .store(count, Ordering::SeqCst);
    }

    /// Yield an undecodable record after the stored ones
    pub fn set_corrupt_records(&self, corrupt: bool) {
        self.corrupt_records.store(corrupt, Ordering::SeqCst);
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// Ids of the records stored for a wallet
    pub async fn stored_ids(&self, wallet_id: &WalletId) -> Vec<TokenId> {
        self.inner
            .fetch_wallet_records(wallet_id)
            .await
            .unwrap()
            .map(|record| record.unwrap().id)
            .collect()
            .await
    }
}

#[async_trait]
impl Database for FlakyDatabase {
    async fn add_wallet(&self, wallet: WalletInfo) -> Result<(), Error> {
        self.inner.add_wallet(wallet).await
    }

    async fn get_wallet(&self, wallet_id: &WalletId) -> Result<Option<WalletInfo>, Error> {
        self.inner.get_wallet(wallet_id).await
    }

    async fn get_wallets(&self) -> Result<Vec<WalletInfo>, Error> {
        self.inner.get_wallets().await
    }

    async fn publish_token_record(&self, record: TokenRecord) -> Result<(), Error> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("publish disabled".to_string()));
        }
        let transient = self
            .transient_publish_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if transient.is_ok() {
            return Err(Error::Unavailable("relay timeout".to_string()));
        }

        self.inner.publish_token_record(record).await
    }

    async fn retire_token_record(&self, token_id: &TokenId) -> Result<(), Error> {
        if self.fail_retire.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("retire disabled".to_string()));
        }
        self.inner.retire_token_record(token_id).await
    }

    async fn get_token_record(&self, token_id: &TokenId) -> Result<Option<TokenRecord>, Error> {
        self.inner.get_token_record(token_id).await
    }

    async fn fetch_wallet_records(&self, wallet_id: &WalletId) -> Result<RecordStream, Error> {
        let records = self.inner.fetch_wallet_records(wallet_id).await?;

        if self.corrupt_records.load(Ordering::SeqCst) {
            let corrupt = TokenRecord::from_json("{\"id\":\"broken\"}")
                .err()
                .map(|err| Error::Unavailable(err.to_string()))
                .into_iter()
                .map(Err);
            return Ok(records.chain(stream::iter(corrupt)).boxed());
        }

        Ok(records)
    }

    async fn add_payment(&self, payment: PaymentRecord) -> Result<(), Error> {
        self.inner.add_payment(payment).await
    }

    async fn get_payments(&self, wallet_id: &WalletId) -> Result<Vec<PaymentRecord>, Error> {
        self.inner.get_payments(wallet_id).await
    }
}

/// Ledger with one wallet using the given mints in order
pub struct TestLedger {
    pub ledger: Ledger,
    pub wallet: WalletInfo,
    pub db: FlakyDatabase,
}

impl TestLedger {
    pub fn wallet_id(&self) -> &WalletId {
        &self.wallet.id
    }

    /// Receive freshly issued proofs of `amounts` from `mint`
    pub async fn fund(&self, mint_url: &MintUrl, mint: &FakeMint, amounts: &[u64]) -> TokenRecord {
        self.ledger
            .receive(&self.wallet.id, mint_url.clone(), mint.issue(amounts))
            .await
            .unwrap()
    }

    pub fn balance(&self) -> u64 {
        self.ledger.balance(&self.wallet.id).to_u64()
    }
}

pub fn builder(db: &FlakyDatabase, mints: &[(MintUrl, FakeMint)]) -> LedgerBuilder {
    mints.iter().fold(
        LedgerBuilder::new()
            .localstore(Arc::new(db.clone()))
            .persist_attempts(2)
            .persist_backoff(Duration::from_millis(1)),
        |builder, (mint_url, mint)| builder.connector(mint_url.clone(), mint.clone()),
    )
}

pub async fn setup(mints: &[(MintUrl, FakeMint)]) -> TestLedger {
    let db = FlakyDatabase::default();
    let ledger = builder(&db, mints).build().unwrap();

    let wallet = ledger
        .create_wallet(
            "test",
            CurrencyUnit::Sat,
            mints.iter().map(|(mint_url, _)| mint_url.clone()).collect(),
            vec![],
        )
        .await
        .unwrap();

    TestLedger { ledger, wallet, db }
}

/// Ledger with one wallet and a single fee free mint
pub async fn setup_single() -> (TestLedger, MintUrl, FakeMint) {
    let url = mint_url("mint");
    let mint = FakeMint::new(Amount::ZERO);
    let test = setup(&[(url.clone(), mint.clone())]).await;
    (test, url, mint)
}

/// Total of proofs, panicking on overflow
pub fn total(proofs: &cdk_ledger::nuts::Proofs) -> u64 {
    proofs.total_amount().unwrap().to_u64()
}
