//! CDK ledger CLI

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use cdk_ledger::{Ledger, LedgerBuilder, WalletId};
use cdk_ledger_redb::LedgerRedbDatabase;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod config;
mod sub_commands;

const DEFAULT_WORK_DIR: &str = ".cdk-ledger-cli";

/// Local e-cash proof ledger
#[derive(Parser)]
#[command(name = "cdk-ledger-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to working dir
    #[arg(short, long)]
    work_dir: Option<PathBuf>,
    /// Logging level
    #[arg(short, long, default_value = "error")]
    log_level: Level,
    /// Config file, defaults to `config.toml` in the work dir
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Wallet to use, defaults to the configured or only wallet
    #[arg(long, env = "CDK_LEDGER_WALLET")]
    wallet: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a wallet
    CreateWallet(sub_commands::create_wallet::CreateWalletSubCommand),
    /// Add a mint to the wallet
    AddMint(sub_commands::add_mint::AddMintSubCommand),
    /// Receive proofs
    Receive(sub_commands::receive::ReceiveSubCommand),
    /// Balance
    Balance,
    /// Pay an invoice
    Pay(sub_commands::pay::PaySubCommand),
    /// Check records with their mints and drop spent proofs
    Reconcile(sub_commands::reconcile::ReconcileSubCommand),
    /// List live token records
    ListRecords,
    /// List payments
    Payments,
    /// List unresolved spends and settlements
    Outstanding,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();
    let default_filter = args.log_level;

    let env_filter = EnvFilter::new(format!(
        "{default_filter},hyper=warn,h2=warn,rustls=warn,reqwest=warn"
    ));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let work_dir = match &args.work_dir {
        Some(work_dir) => work_dir.clone(),
        None => match home::home_dir() {
            Some(home_dir) => home_dir.join(DEFAULT_WORK_DIR),
            None => bail!("Could not find home dir, set --work-dir"),
        },
    };

    fs::create_dir_all(&work_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| work_dir.join("config.toml"));
    let settings = config::Settings::new(&config_path)?;

    let redb_path = work_dir.join("cdk-ledger-cli.redb");
    let localstore = Arc::new(LedgerRedbDatabase::new(&redb_path)?);

    let ledger = LedgerBuilder::new()
        .localstore(localstore)
        .config(settings.ledger_config())
        .build()?;

    ledger.load_wallets().await?;

    match &args.command {
        Commands::CreateWallet(sub_command_args) => {
            sub_commands::create_wallet::create_wallet(&ledger, &settings, sub_command_args).await
        }
        Commands::AddMint(sub_command_args) => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::add_mint::add_mint(&ledger, &wallet_id, sub_command_args).await
        }
        Commands::Receive(sub_command_args) => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::receive::receive(&ledger, &wallet_id, sub_command_args).await
        }
        Commands::Balance => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::balance::balance(&ledger, &wallet_id)
        }
        Commands::Pay(sub_command_args) => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::pay::pay(&ledger, &wallet_id, sub_command_args).await
        }
        Commands::Reconcile(sub_command_args) => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::reconcile::reconcile(&ledger, &wallet_id, sub_command_args).await
        }
        Commands::ListRecords => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::list_records::list_records(&ledger, &wallet_id)
        }
        Commands::Payments => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::payments::payments(&ledger, &wallet_id).await
        }
        Commands::Outstanding => {
            let wallet_id = select_wallet(&ledger, &args, &settings)?;
            sub_commands::outstanding::outstanding(&ledger, &wallet_id)
        }
    }
}

/// Wallet from the command line, the config, or the only stored wallet
fn select_wallet(ledger: &Ledger, args: &Cli, settings: &config::Settings) -> Result<WalletId> {
    if let Some(wallet_id) = args.wallet.as_ref().or(settings.wallet.wallet_id.as_ref()) {
        let wallet_id: WalletId = wallet_id.parse()?;
        if ledger.wallet(&wallet_id).is_none() {
            bail!("Unknown wallet {wallet_id}");
        }
        return Ok(wallet_id);
    }

    let wallets = ledger.wallets();
    match wallets.as_slice() {
        [wallet] => Ok(wallet.id.clone()),
        [] => bail!("No wallet found, create one with create-wallet"),
        _ => bail!("Several wallets found, select one with --wallet"),
    }
}
