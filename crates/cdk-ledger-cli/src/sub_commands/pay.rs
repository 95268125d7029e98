use anyhow::Result;
use cdk_ledger::{Amount, Error, Ledger, WalletId};
use clap::Args;

#[derive(Args)]
pub struct PaySubCommand {
    /// Invoice to pay
    invoice: String,
    /// Amount of the invoice
    #[arg(short, long)]
    amount: u64,
}

pub async fn pay(
    ledger: &Ledger,
    wallet_id: &WalletId,
    sub_command_args: &PaySubCommand,
) -> Result<()> {
    let result = ledger
        .pay(
            wallet_id,
            sub_command_args.invoice.trim(),
            Amount::from(sub_command_args.amount),
        )
        .await;

    let payment = match result {
        Ok(payment) => payment,
        Err(err @ Error::AmbiguousOutcome { .. }) => {
            println!("{err}");
            println!("Run reconcile before paying from this mint again");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    println!("Paid {} from {}", payment.amount, payment.mint_url);
    println!("Fee: {}", payment.fee_paid);
    println!("Change: {}", payment.change);
    if let Some(preimage) = payment.preimage {
        println!("Payment preimage: {preimage}");
    }

    Ok(())
}
