use anyhow::Result;
use cdk_ledger::{Ledger, WalletId};

pub fn balance(ledger: &Ledger, wallet_id: &WalletId) -> Result<()> {
    for (i, (mint_url, amount)) in ledger.mint_balances(wallet_id).iter().enumerate() {
        println!("{i}: {mint_url} {amount}");
    }
    println!("Total balance: {}", ledger.balance(wallet_id));

    Ok(())
}
