use anyhow::Result;
use cdk_ledger::{Ledger, OutstandingAttempt, WalletId};

pub fn outstanding(ledger: &Ledger, wallet_id: &WalletId) -> Result<()> {
    let attempts = ledger.outstanding(wallet_id);
    if attempts.is_empty() {
        println!("Nothing outstanding");
        return Ok(());
    }

    for attempt in attempts {
        match attempt {
            OutstandingAttempt::Ambiguous {
                mint_url,
                token_ids,
            } => println!(
                "Unknown spend outcome at {}, {} records to verify",
                mint_url,
                token_ids.len()
            ),
            OutstandingAttempt::UnsettledPayment {
                mint_url,
                consumed,
                replacement_persisted,
            } => println!(
                "Unsettled payment at {}, {} records to retire, replacement stored: {}",
                mint_url,
                consumed.len(),
                replacement_persisted
            ),
        }
    }

    Ok(())
}
