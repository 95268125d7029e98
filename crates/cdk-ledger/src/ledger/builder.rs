use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cdk_ledger_common::database::Database;
use cdk_ledger_common::{Error, MintConnector, MintUrl};

use super::{Ledger, LedgerConfig};

/// Builder for creating a new [`Ledger`]
#[derive(Debug, Default)]
pub struct LedgerBuilder {
    localstore: Option<Arc<dyn Database + Send + Sync>>,
    connectors: HashMap<MintUrl, Arc<dyn MintConnector + Send + Sync>>,
    config: LedgerConfig,
}

impl LedgerBuilder {
    /// Create a new LedgerBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the local storage backend
    pub fn localstore(mut self, localstore: Arc<dyn Database + Send + Sync>) -> Self {
        self.localstore = Some(localstore);
        self
    }

    /// Set a custom connector for a mint
    pub fn connector<C: MintConnector + 'static + Send + Sync>(
        mut self,
        mint_url: MintUrl,
        connector: C,
    ) -> Self {
        self.connectors.insert(mint_url, Arc::new(connector));
        self
    }

    /// Set a custom connector for a mint from Arc
    pub fn shared_connector(
        mut self,
        mint_url: MintUrl,
        connector: Arc<dyn MintConnector + Send + Sync>,
    ) -> Self {
        self.connectors.insert(mint_url, connector);
        self
    }

    /// Set the number of attempts for every storage write
    pub fn persist_attempts(mut self, attempts: u32) -> Self {
        self.config.persist_attempts = attempts;
        self
    }

    /// Set the backoff step between storage write attempts
    pub fn persist_backoff(mut self, backoff: Duration) -> Self {
        self.config.persist_backoff = backoff;
        self
    }

    /// Set the timeout of requests to mints without a custom connector
    pub fn mint_timeout(mut self, timeout: Duration) -> Self {
        self.config.mint_timeout = timeout;
        self
    }

    /// Set all settings at once
    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the ledger
    pub fn build(self) -> Result<Ledger, Error> {
        let localstore = self
            .localstore
            .ok_or(Error::Custom("Localstore required".to_string()))?;

        if self.config.persist_attempts == 0 {
            return Err(Error::Custom(
                "At least one persist attempt required".to_string(),
            ));
        }

        Ok(Ledger::new(localstore, self.connectors, self.config))
    }
}
