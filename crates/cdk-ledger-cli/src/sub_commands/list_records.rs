use anyhow::Result;
use cdk_ledger::{Ledger, WalletId};

pub fn list_records(ledger: &Ledger, wallet_id: &WalletId) -> Result<()> {
    for record in ledger.token_records(wallet_id) {
        println!(
            "{} {} {} ({} proofs)",
            record.id,
            record.mint_url,
            record.total_amount()?,
            record.proofs.len()
        );
    }

    Ok(())
}
