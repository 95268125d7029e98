use anyhow::Result;
use cdk_ledger::{Ledger, WalletId};

pub async fn payments(ledger: &Ledger, wallet_id: &WalletId) -> Result<()> {
    for payment in ledger.payments(wallet_id).await? {
        println!(
            "{} {} amount: {} fee: {} change: {} at {}",
            payment.id,
            payment.mint_url,
            payment.amount,
            payment.fee_paid,
            payment.change,
            payment.timestamp
        );
    }

    Ok(())
}
