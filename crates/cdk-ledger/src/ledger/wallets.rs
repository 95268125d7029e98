//! Wallets and remote record updates

use cdk_ledger_common::nuts::CurrencyUnit;
use cdk_ledger_common::{Error, MintUrl, RecordUpdate, TokenRecord, WalletId, WalletInfo};
use futures::{Stream, StreamExt};
use tracing::instrument;

use super::Ledger;

impl Ledger {
    /// Create a wallet and store it
    #[instrument(skip(self))]
    pub async fn create_wallet(
        &self,
        name: &str,
        unit: CurrencyUnit,
        mint_urls: Vec<MintUrl>,
        relays: Vec<String>,
    ) -> Result<WalletInfo, Error> {
        let wallet = WalletInfo::new(name, unit, mint_urls, relays);

        self.localstore.add_wallet(wallet.clone()).await?;
        self.wallets
            .write()
            .insert(wallet.id.clone(), wallet.clone());

        tracing::debug!("Created wallet {}", wallet.id);

        Ok(wallet)
    }

    /// Wallet loaded into the ledger
    pub fn wallet(&self, wallet_id: &WalletId) -> Option<WalletInfo> {
        self.wallets.read().get(wallet_id).cloned()
    }

    /// All wallets loaded into the ledger
    pub fn wallets(&self) -> Vec<WalletInfo> {
        self.wallets.read().values().cloned().collect()
    }

    /// Add a mint to a wallet
    ///
    /// Returns `false` when the wallet already uses the mint.
    #[instrument(skip(self))]
    pub async fn add_mint(&self, wallet_id: &WalletId, mint_url: MintUrl) -> Result<bool, Error> {
        let wallet = {
            let mut wallets = self.wallets.write();
            let wallet = wallets
                .get_mut(wallet_id)
                .ok_or_else(|| Error::UnknownWallet(wallet_id.clone()))?;
            if !wallet.add_mint(mint_url) {
                return Ok(false);
            }
            wallet.clone()
        };

        self.localstore.add_wallet(wallet).await?;

        Ok(true)
    }

    /// Load a stored wallet and its live records
    ///
    /// Records that fail to decode are skipped. Mints of loaded records the wallet does not
    /// list yet are added to it.
    #[instrument(skip(self))]
    pub async fn load_wallet(&self, wallet_id: &WalletId) -> Result<WalletInfo, Error> {
        let wallet = self
            .localstore
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| Error::UnknownWallet(wallet_id.clone()))?;

        self.wallets
            .write()
            .insert(wallet.id.clone(), wallet.clone());

        let mut records = self.localstore.fetch_wallet_records(wallet_id).await?;
        let mut loaded: Vec<TokenRecord> = Vec::new();
        let mut skipped = 0;

        while let Some(record) = records.next().await {
            match record {
                Ok(record) if &record.wallet_id == wallet_id => loaded.push(record),
                Ok(record) => {
                    tracing::warn!(
                        "Skipping token record {} of wallet {}",
                        record.id,
                        record.wallet_id
                    );
                    skipped += 1;
                }
                Err(err) => {
                    tracing::warn!("Skipping token record that could not be decoded: {}", err);
                    skipped += 1;
                }
            }
        }

        tracing::debug!(
            "Loaded {} token records for wallet {}, skipped {}",
            loaded.len(),
            wallet_id,
            skipped
        );

        let mut mint_urls: Vec<MintUrl> = Vec::new();
        {
            let mut store = self.store.write();
            for record in loaded {
                if !mint_urls.contains(&record.mint_url) {
                    mint_urls.push(record.mint_url.clone());
                }
                store.upsert_token_record(record);
            }
        }

        for mint_url in mint_urls {
            self.add_mint(wallet_id, mint_url).await?;
        }

        self.wallet_info(wallet_id)
    }

    /// Load every stored wallet
    #[instrument(skip(self))]
    pub async fn load_wallets(&self) -> Result<Vec<WalletInfo>, Error> {
        let mut wallets = Vec::new();
        for wallet in self.localstore.get_wallets().await? {
            wallets.push(self.load_wallet(&wallet.id).await?);
        }
        Ok(wallets)
    }

    /// Apply a record change made by another session
    ///
    /// The change is already durable, only the live view is updated.
    #[instrument(skip_all)]
    pub async fn apply_update(&self, update: RecordUpdate) -> Result<(), Error> {
        match update {
            RecordUpdate::Published(record) => {
                record.validate()?;
                self.wallet_info(&record.wallet_id)?;

                let wallet_id = record.wallet_id.clone();
                let mint_url = record.mint_url.clone();
                tracing::debug!("Applying published token record {}", record.id);
                self.store.write().upsert_token_record(record);

                self.add_mint(&wallet_id, mint_url).await?;
            }
            RecordUpdate::Retired(token_id) => {
                tracing::debug!("Applying retired token record {}", token_id);
                self.store.write().retire_token_record(&token_id);
            }
        }

        Ok(())
    }

    /// Apply a stream of record changes, stopping at the first invalid one
    pub async fn apply_updates<S>(&self, updates: S) -> Result<(), Error>
    where
        S: Stream<Item = RecordUpdate> + Send,
    {
        futures::pin_mut!(updates);
        while let Some(update) = updates.next().await {
            self.apply_update(update).await?;
        }
        Ok(())
    }
}
