use std::str::FromStr;

use anyhow::Result;
use cdk_ledger::{Ledger, MintUrl, WalletId};
use clap::Args;

#[derive(Args)]
pub struct AddMintSubCommand {
    /// Mint url
    mint_url: String,
}

pub async fn add_mint(
    ledger: &Ledger,
    wallet_id: &WalletId,
    sub_command_args: &AddMintSubCommand,
) -> Result<()> {
    let mint_url = MintUrl::from_str(&sub_command_args.mint_url)?;

    match ledger.add_mint(wallet_id, mint_url.clone()).await? {
        true => println!("Added {mint_url}"),
        false => println!("Wallet already uses {mint_url}"),
    }

    Ok(())
}
