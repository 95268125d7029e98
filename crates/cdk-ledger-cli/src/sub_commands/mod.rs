pub mod add_mint;
pub mod balance;
pub mod create_wallet;
pub mod list_records;
pub mod outstanding;
pub mod pay;
pub mod payments;
pub mod receive;
pub mod reconcile;
