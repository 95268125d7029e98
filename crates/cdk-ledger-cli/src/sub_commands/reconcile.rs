use std::str::FromStr;

use anyhow::Result;
use cdk_ledger::{Ledger, TokenId, WalletId};
use clap::Args;

#[derive(Args)]
pub struct ReconcileSubCommand {
    /// Only reconcile this token record
    #[arg(short, long)]
    token: Option<String>,
}

pub async fn reconcile(
    ledger: &Ledger,
    wallet_id: &WalletId,
    sub_command_args: &ReconcileSubCommand,
) -> Result<()> {
    if let Some(token) = &sub_command_args.token {
        let token_id = TokenId::from_str(token)?;
        match ledger.reconcile(&token_id).await? {
            true => println!("Token record {token_id} had spent proofs"),
            false => println!("Token record {token_id} is unchanged"),
        }
        return Ok(());
    }

    let report = ledger.reconcile_all(wallet_id).await?;

    println!("Changed: {}", report.changed.len());
    println!("Unchanged: {}", report.unchanged.len());
    for failure in &report.failed {
        match &failure.token_id {
            Some(token_id) => println!("Failed {} at {}: {}", token_id, failure.mint_url, failure.error),
            None => println!("Failed at {}: {}", failure.mint_url, failure.error),
        }
    }
    println!("Balance: {}", ledger.balance(wallet_id));

    Ok(())
}
