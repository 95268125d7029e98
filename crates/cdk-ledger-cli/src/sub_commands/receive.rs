use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};
use cdk_ledger::nuts::Proofs;
use cdk_ledger::{Ledger, MintUrl, WalletId};
use clap::Args;

#[derive(Args)]
pub struct ReceiveSubCommand {
    /// Mint that issued the proofs
    #[arg(short, long)]
    mint: String,
    /// Proofs as a JSON array
    proofs: Option<String>,
    /// Read the proofs from a file instead
    #[arg(short, long)]
    file: Option<PathBuf>,
}

pub async fn receive(
    ledger: &Ledger,
    wallet_id: &WalletId,
    sub_command_args: &ReceiveSubCommand,
) -> Result<()> {
    let json = match (&sub_command_args.proofs, &sub_command_args.file) {
        (Some(proofs), None) => proofs.clone(),
        (None, Some(file)) => fs::read_to_string(file)?,
        _ => bail!("Give either the proofs or --file"),
    };

    let proofs: Proofs = serde_json::from_str(json.trim())?;
    let mint_url = MintUrl::from_str(&sub_command_args.mint)?;

    let record = ledger.receive(wallet_id, mint_url, proofs).await?;

    println!(
        "Received {} in token record {}",
        record.total_amount()?,
        record.id
    );

    Ok(())
}
