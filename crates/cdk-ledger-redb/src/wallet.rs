//! Redb Ledger Database

use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use cdk_ledger_common::database::{self, RecordStream};
use cdk_ledger_common::{PaymentRecord, TokenId, TokenRecord, WalletId, WalletInfo};
use futures::{stream, StreamExt};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::instrument;

use super::error::Error;

const CONFIG_TABLE: TableDefinition<&str, &str> = TableDefinition::new("config");
// <Wallet_id, Wallet>
const WALLETS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("wallets");
// <(Wallet_id, Seq), Token record>
const TOKEN_RECORDS_TABLE: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("token_records");
// <Token_id, (Wallet_id, Seq)>
const RECORD_POSITIONS_TABLE: TableDefinition<&str, (&str, u64)> =
    TableDefinition::new("record_positions");
// <(Wallet_id, Seq), Payment record>
const PAYMENTS_TABLE: TableDefinition<(&str, u64), &str> = TableDefinition::new("payments");
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const RECORD_COUNTER: &str = "token_records";
const PAYMENT_COUNTER: &str = "payments";

const DATABASE_VERSION: u32 = 1;

/// Ledger Redb Database
#[derive(Debug, Clone)]
pub struct LedgerRedbDatabase {
    db: Arc<Database>,
}

impl LedgerRedbDatabase {
    /// Create new [`LedgerRedbDatabase`]
    pub fn new(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("Parent directory does not exist: {parent:?}"),
                )));
            }
        }

        let db = Database::create(path)?;

        let db_version: Option<String>;
        {
            // Check database version
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(CONFIG_TABLE);

            db_version = match table {
                Ok(table) => table.get("db_version")?.map(|v| v.value().to_string()),
                Err(_) => None,
            };
        }

        match db_version {
            Some(db_version) => {
                let current_file_version = u32::from_str(&db_version)?;

                match current_file_version.cmp(&DATABASE_VERSION) {
                    Ordering::Equal => {
                        tracing::info!("Database is at current version {}", DATABASE_VERSION);
                    }
                    Ordering::Less | Ordering::Greater => {
                        tracing::warn!(
                            "Database is at version {}, supported version is {}",
                            current_file_version,
                            DATABASE_VERSION
                        );
                        return Err(Error::UnknownDatabaseVersion);
                    }
                }
            }
            None => {
                let write_txn = db.begin_write()?;
                {
                    let mut table = write_txn.open_table(CONFIG_TABLE)?;
                    // Open all tables to init a new db
                    let _ = write_txn.open_table(WALLETS_TABLE)?;
                    let _ = write_txn.open_table(TOKEN_RECORDS_TABLE)?;
                    let _ = write_txn.open_table(RECORD_POSITIONS_TABLE)?;
                    let _ = write_txn.open_table(PAYMENTS_TABLE)?;
                    let _ = write_txn.open_table(COUNTERS_TABLE)?;
                    table.insert("db_version", DATABASE_VERSION.to_string().as_str())?;
                }

                write_txn.commit()?;
            }
        }

        Ok(Self { db: Arc::new(db) })
    }
}

/// Take the next value of a counter
fn next_seq(write_txn: &redb::WriteTransaction, counter: &str) -> Result<u64, Error> {
    let mut table = write_txn.open_table(COUNTERS_TABLE)?;
    let seq = table.get(counter)?.map(|v| v.value()).unwrap_or_default();
    table.insert(counter, seq + 1)?;
    Ok(seq)
}

#[async_trait]
impl cdk_ledger_common::database::Database for LedgerRedbDatabase {
    #[instrument(skip_all, fields(wallet_id = %wallet.id))]
    async fn add_wallet(&self, wallet: WalletInfo) -> Result<(), database::Error> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;
        {
            let mut table = write_txn.open_table(WALLETS_TABLE).map_err(Error::from)?;
            table
                .insert(
                    wallet.id.as_str(),
                    serde_json::to_string(&wallet)
                        .map_err(Error::from)?
                        .as_str(),
                )
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_wallet(&self, wallet_id: &WalletId) -> Result<Option<WalletInfo>, database::Error> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(WALLETS_TABLE).map_err(Error::from)?;

        if let Some(wallet) = table.get(wallet_id.as_str()).map_err(Error::from)? {
            return Ok(serde_json::from_str(wallet.value()).map_err(Error::from)?);
        }

        Ok(None)
    }

    #[instrument(skip(self))]
    async fn get_wallets(&self) -> Result<Vec<WalletInfo>, database::Error> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(WALLETS_TABLE).map_err(Error::from)?;

        Ok(table
            .iter()
            .map_err(Error::from)?
            .flatten()
            .flat_map(|(_id, wallet)| serde_json::from_str(wallet.value()))
            .collect())
    }

    #[instrument(skip_all, fields(token_id = %record.id))]
    async fn publish_token_record(&self, record: TokenRecord) -> Result<(), database::Error> {
        let json = serde_json::to_string(&record).map_err(Error::from)?;

        let write_txn = self.db.begin_write().map_err(Error::from)?;
        {
            let position = {
                let positions = write_txn
                    .open_table(RECORD_POSITIONS_TABLE)
                    .map_err(Error::from)?;
                let position = positions
                    .get(record.id.as_str())
                    .map_err(Error::from)?
                    .map(|v| {
                        let (wallet_id, seq) = v.value();
                        (wallet_id.to_string(), seq)
                    });
                position
            };

            // A republished record keeps its position
            let (wallet_id, seq) = match position {
                Some(position) => position,
                None => {
                    let seq = next_seq(&write_txn, RECORD_COUNTER)?;
                    let mut positions = write_txn
                        .open_table(RECORD_POSITIONS_TABLE)
                        .map_err(Error::from)?;
                    positions
                        .insert(record.id.as_str(), (record.wallet_id.as_str(), seq))
                        .map_err(Error::from)?;
                    (record.wallet_id.as_str().to_string(), seq)
                }
            };

            let mut table = write_txn
                .open_table(TOKEN_RECORDS_TABLE)
                .map_err(Error::from)?;
            table
                .insert((wallet_id.as_str(), seq), json.as_str())
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn retire_token_record(&self, token_id: &TokenId) -> Result<(), database::Error> {
        let write_txn = self.db.begin_write().map_err(Error::from)?;
        {
            let mut positions = write_txn
                .open_table(RECORD_POSITIONS_TABLE)
                .map_err(Error::from)?;
            let position = positions
                .remove(token_id.as_str())
                .map_err(Error::from)?
                .map(|v| {
                    let (wallet_id, seq) = v.value();
                    (wallet_id.to_string(), seq)
                });

            if let Some((wallet_id, seq)) = position {
                let mut table = write_txn
                    .open_table(TOKEN_RECORDS_TABLE)
                    .map_err(Error::from)?;
                table
                    .remove((wallet_id.as_str(), seq))
                    .map_err(Error::from)?;
            }
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_token_record(
        &self,
        token_id: &TokenId,
    ) -> Result<Option<TokenRecord>, database::Error> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let positions = read_txn
            .open_table(RECORD_POSITIONS_TABLE)
            .map_err(Error::from)?;

        let Some(position) = positions.get(token_id.as_str()).map_err(Error::from)? else {
            return Ok(None);
        };

        let table = read_txn
            .open_table(TOKEN_RECORDS_TABLE)
            .map_err(Error::from)?;

        match table.get(position.value()).map_err(Error::from)? {
            Some(record) => Ok(Some(
                serde_json::from_str(record.value()).map_err(Error::from)?,
            )),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_wallet_records(
        &self,
        wallet_id: &WalletId,
    ) -> Result<RecordStream, database::Error> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn
            .open_table(TOKEN_RECORDS_TABLE)
            .map_err(Error::from)?;

        let records: Vec<Result<TokenRecord, database::Error>> = table
            .range((wallet_id.as_str(), 0)..=(wallet_id.as_str(), u64::MAX))
            .map_err(Error::from)?
            .map(|entry| -> Result<TokenRecord, database::Error> {
                let (_, record) = entry.map_err(Error::from)?;
                Ok(serde_json::from_str(record.value()).map_err(Error::from)?)
            })
            .collect();

        Ok(stream::iter(records).boxed())
    }

    #[instrument(skip_all, fields(payment_id = %payment.id))]
    async fn add_payment(&self, payment: PaymentRecord) -> Result<(), database::Error> {
        let json = serde_json::to_string(&payment).map_err(Error::from)?;

        let write_txn = self.db.begin_write().map_err(Error::from)?;
        {
            let seq = next_seq(&write_txn, PAYMENT_COUNTER)?;
            let mut table = write_txn.open_table(PAYMENTS_TABLE).map_err(Error::from)?;
            table
                .insert((payment.wallet_id.as_str(), seq), json.as_str())
                .map_err(Error::from)?;
        }
        write_txn.commit().map_err(Error::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_payments(&self, wallet_id: &WalletId) -> Result<Vec<PaymentRecord>, database::Error> {
        let read_txn = self.db.begin_read().map_err(Error::from)?;
        let table = read_txn.open_table(PAYMENTS_TABLE).map_err(Error::from)?;

        let mut payments = Vec::new();
        for entry in table
            .range((wallet_id.as_str(), 0)..=(wallet_id.as_str(), u64::MAX))
            .map_err(Error::from)?
        {
            let (_, payment) = entry.map_err(Error::from)?;
            payments.push(serde_json::from_str(payment.value()).map_err(Error::from)?);
        }

        Ok(payments)
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;
    use std::str::FromStr;

    use cdk_ledger_common::database::Database as _;
    use cdk_ledger_common::dhke::hash_to_curve;
    use cdk_ledger_common::nuts::{CurrencyUnit, Id, Proof};
    use cdk_ledger_common::{ledger_db_test, Amount, MintUrl, Secret};

    use super::*;

    async fn provide_db(test_id: String) -> LedgerRedbDatabase {
        let path = PathBuf::from(format!(
            "/tmp/cdk-ledger-test-{}-{}.redb",
            test_id,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        LedgerRedbDatabase::new(&path).unwrap()
    }

    ledger_db_test!(provide_db);

    fn record(wallet_id: &WalletId, amount: u64) -> TokenRecord {
        let secret = Secret::generate();
        let c = hash_to_curve(secret.as_bytes()).unwrap();
        TokenRecord::new(
            wallet_id.clone(),
            MintUrl::from_str("https://mint.example.com").unwrap(),
            vec![Proof::new(
                Amount::from(amount),
                Id::from_str("00916bbf7ef91a36").unwrap(),
                secret,
                c,
            )],
        )
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        let wallet = WalletInfo::new("reopen", CurrencyUnit::Sat, vec![], vec![]);
        let first = record(&wallet.id, 1);
        let second = record(&wallet.id, 2);

        {
            let db = LedgerRedbDatabase::new(&path).unwrap();
            db.add_wallet(wallet.clone()).await.unwrap();
            db.publish_token_record(first.clone()).await.unwrap();
            db.publish_token_record(second.clone()).await.unwrap();
            db.retire_token_record(&first.id).await.unwrap();
        }

        let db = LedgerRedbDatabase::new(&path).unwrap();
        assert_eq!(db.get_wallet(&wallet.id).await.unwrap(), Some(wallet.clone()));

        let third = record(&wallet.id, 4);
        db.publish_token_record(third.clone()).await.unwrap();

        let records: Vec<TokenRecord> = db
            .fetch_wallet_records(&wallet.id)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(records, vec![second, third]);
    }

    #[tokio::test]
    async fn test_undecodable_record_is_yielded_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = LedgerRedbDatabase::new(&dir.path().join("ledger.redb")).unwrap();
        let wallet_id = WalletId::generate();
        let valid = record(&wallet_id, 8);

        {
            let write_txn = db.db.begin_write().unwrap();
            {
                let mut table = write_txn.open_table(TOKEN_RECORDS_TABLE).unwrap();
                table
                    .insert((wallet_id.as_str(), u64::MAX - 1), "{\"proofs\":[]}")
                    .unwrap();
            }
            write_txn.commit().unwrap();
        }
        db.publish_token_record(valid.clone()).await.unwrap();

        let results: Vec<_> = db
            .fetch_wallet_records(&wallet_id)
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &valid);
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");

        {
            let db = Database::create(&path).unwrap();
            let write_txn = db.begin_write().unwrap();
            {
                let mut table = write_txn.open_table(CONFIG_TABLE).unwrap();
                table.insert("db_version", "99").unwrap();
            }
            write_txn.commit().unwrap();
        }

        assert!(matches!(
            LedgerRedbDatabase::new(&path),
            Err(Error::UnknownDatabaseVersion)
        ));
    }

    #[test]
    fn test_missing_parent_directory() {
        let path = PathBuf::from("/nonexistent-cdk-ledger-dir/ledger.redb");
        assert!(matches!(LedgerRedbDatabase::new(&path), Err(Error::Io(_))));
    }
}
