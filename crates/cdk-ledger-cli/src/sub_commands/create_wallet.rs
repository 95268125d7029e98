use std::str::FromStr;

use anyhow::Result;
use cdk_ledger::nuts::CurrencyUnit;
use cdk_ledger::{Ledger, MintUrl};
use clap::Args;

use crate::config::Settings;

#[derive(Args)]
pub struct CreateWalletSubCommand {
    /// Wallet name
    #[arg(short, long, default_value = "default")]
    name: String,
    /// Mint url, can be repeated. Defaults to the configured mints
    #[arg(short, long)]
    mint: Vec<String>,
    /// Relay url, can be repeated
    #[arg(short, long)]
    relay: Vec<String>,
    /// Currency unit
    #[arg(short, long, default_value = "sat")]
    unit: String,
}

pub async fn create_wallet(
    ledger: &Ledger,
    settings: &Settings,
    sub_command_args: &CreateWalletSubCommand,
) -> Result<()> {
    let mints = match sub_command_args.mint.is_empty() {
        true => &settings.wallet.default_mints,
        false => &sub_command_args.mint,
    };

    let mint_urls = mints
        .iter()
        .map(|mint| MintUrl::from_str(mint))
        .collect::<Result<Vec<_>, _>>()?;
    let unit = CurrencyUnit::from_str(&sub_command_args.unit)?;

    let wallet = ledger
        .create_wallet(
            &sub_command_args.name,
            unit,
            mint_urls,
            sub_command_args.relay.clone(),
        )
        .await?;

    println!("Created wallet {} ({})", wallet.id, wallet.name);
    for (i, mint_url) in wallet.mint_urls.iter().enumerate() {
        println!("{i}: {mint_url}");
    }

    Ok(())
}
