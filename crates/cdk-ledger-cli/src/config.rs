use std::path::Path;
use std::time::Duration;

use cdk_ledger::ledger::{DEFAULT_MINT_TIMEOUT, DEFAULT_PERSIST_ATTEMPTS, DEFAULT_PERSIST_BACKOFF};
use cdk_ledger::LedgerConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MINTS: [&str; 2] = [
    "https://mint.minibits.cash/Bitcoin",
    "https://mint.agorist.space",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub persist_attempts: u32,
    pub persist_backoff_ms: u64,
    pub mint_timeout_secs: u64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            persist_attempts: DEFAULT_PERSIST_ATTEMPTS,
            persist_backoff_ms: DEFAULT_PERSIST_BACKOFF.as_millis() as u64,
            mint_timeout_secs: DEFAULT_MINT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet used when none is given on the command line
    pub wallet_id: Option<String>,
    /// Mints of new wallets created without `--mint`
    pub default_mints: Vec<String>,
}

impl Default for Wallet {
    fn default() -> Self {
        Self {
            wallet_id: None,
            default_mints: DEFAULT_MINTS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub ledger: Ledger,
    pub wallet: Wallet,
}

impl Settings {
    /// Defaults, overridden by the config file when it exists, then by `CDK_LEDGER__*` variables
    pub fn new(config_file: &Path) -> Result<Self, ConfigError> {
        let default_settings = Self::default();

        let config = Config::builder()
            .add_source(Config::try_from(&default_settings)?)
            .add_source(File::from(config_file).required(false))
            .add_source(
                Environment::with_prefix("CDK_LEDGER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            persist_attempts: self.ledger.persist_attempts,
            persist_backoff: Duration::from_millis(self.ledger.persist_backoff_ms),
            mint_timeout: Duration::from_secs(self.ledger.mint_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(&dir.path().join("config.toml")).unwrap();

        assert_eq!(settings.wallet.default_mints.len(), 2);
        assert_eq!(settings.ledger_config(), LedgerConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[ledger]
persist_attempts = 9
persist_backoff_ms = 10

[wallet]
default_mints = ["https://mint.example.com"]
"#,
        )
        .unwrap();

        let settings = Settings::new(&path).unwrap();

        assert_eq!(settings.ledger.persist_attempts, 9);
        assert_eq!(settings.ledger.mint_timeout_secs, DEFAULT_MINT_TIMEOUT.as_secs());
        assert_eq!(
            settings.ledger_config().persist_backoff,
            Duration::from_millis(10)
        );
        assert_eq!(
            settings.wallet.default_mints,
            vec!["https://mint.example.com".to_string()]
        );
        assert_eq!(settings.wallet.wallet_id, None);
    }
}
