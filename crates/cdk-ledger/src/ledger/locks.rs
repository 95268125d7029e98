//! Per (wallet, mint) exclusive sections

use std::collections::HashMap;
use std::sync::Arc;

use cdk_ledger_common::{MintUrl, WalletId};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub(crate) struct MintLocks {
    locks: Mutex<HashMap<(WalletId, MintUrl), Arc<tokio::sync::Mutex<()>>>>,
}

impl MintLocks {
    /// Wait for the exclusive section of a wallet's mint
    ///
    /// The section is held until the returned guard is dropped, which may happen on another task.
    pub(crate) async fn lock(&self, wallet_id: &WalletId, mint_url: &MintUrl) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .entry((wallet_id.clone(), mint_url.clone()))
            .or_default()
            .clone();

        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_mint_is_exclusive() {
        let locks = MintLocks::default();
        let wallet_id = WalletId::generate();
        let mint_a = MintUrl::from_str("https://a.example.com").unwrap();
        let mint_b = MintUrl::from_str("https://b.example.com").unwrap();

        let guard = locks.lock(&wallet_id, &mint_a).await;

        assert!(
            tokio::time::timeout(Duration::from_millis(20), locks.lock(&wallet_id, &mint_a))
                .await
                .is_err()
        );
        assert!(
            tokio::time::timeout(Duration::from_millis(20), locks.lock(&wallet_id, &mint_b))
                .await
                .is_ok()
        );
        assert!(tokio::time::timeout(
            Duration::from_millis(20),
            locks.lock(&WalletId::generate(), &mint_a)
        )
        .await
        .is_ok());

        drop(guard);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), locks.lock(&wallet_id, &mint_a))
                .await
                .is_ok()
        );
    }
}
