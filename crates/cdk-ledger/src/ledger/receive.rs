//! Receiving proofs

use cdk_ledger_common::nuts::Proofs;
use cdk_ledger_common::{Error, MintUrl, TokenRecord, WalletId};
use tracing::instrument;

use super::Ledger;

impl Ledger {
    /// Store proofs issued by `mint_url` as a new token record of the wallet
    ///
    /// The proofs are not checked with the mint. Proofs already held by the wallet are rejected
    /// with [`Error::DuplicateProof`].
    #[instrument(skip(self, proofs), fields(count = proofs.len()))]
    pub async fn receive(
        &self,
        wallet_id: &WalletId,
        mint_url: MintUrl,
        proofs: Proofs,
    ) -> Result<TokenRecord, Error> {
        self.wallet_info(wallet_id)?;

        let record = TokenRecord::new(wallet_id.clone(), mint_url.clone(), proofs);
        record.validate()?;

        let duplicate = {
            let store = self.store.read();
            record
                .proofs
                .iter()
                .any(|proof| store.contains_secret(wallet_id, &proof.secret))
        };
        if duplicate {
            return Err(Error::DuplicateProof);
        }

        self.add_mint(wallet_id, mint_url).await?;

        self.persist("publish received record", || {
            self.localstore.publish_token_record(record.clone())
        })
        .await?;

        self.store.write().upsert_token_record(record.clone());

        tracing::info!(
            "Received {} into token record {}",
            record.total_amount()?,
            record.id
        );

        Ok(record)
    }
}
