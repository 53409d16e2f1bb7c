//! Balance synchronization for a single token.

use crate::chain::ChainClient;
use crate::config::RetryPolicy;
use crate::kit::sync::events::{EventSink, SyncEvent};
use crate::kit::sync::retry::with_retry;
use crate::kit::{Balance, KitError, TokenId};
use crate::storage::Storage;

use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches one token's balance, persists it and reports the outcome as a `SyncEvent`.
///
/// Holds no state of its own between calls; the last value lives in storage.
#[derive(Clone)]
pub struct BalanceSyncManager {
    storage: Arc<dyn Storage>,
    chain: Arc<dyn ChainClient>,
    events: EventSink,
    retry: RetryPolicy,
}

impl BalanceSyncManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        chain: Arc<dyn ChainClient>,
        events: EventSink,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            chain,
            events,
            retry,
        }
    }

    /// Last persisted balance, used as the initial value when a token is registered.
    pub async fn cached_balance(&self, account: &str, token: &TokenId) -> Option<Balance> {
        match self
            .storage
            .get_balance(account, &token.contract, &token.symbol)
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Failed to read cached balance for {}: {}", token, e);
                None
            }
        }
    }

    /// Sync the balance of `token` for `account`.
    ///
    /// Emits exactly one of `BalanceSynced` / `BalanceSyncFailed` when done. Once the event
    /// sink is closed nothing is persisted or emitted.
    pub async fn sync(&self, account: &str, token: &TokenId) {
        match self.fetch_and_store(account, token).await {
            Ok(None) => debug!("Balance sync for {} halted", token),
            Ok(Some(balance)) => {
                debug!("Synced balance {} {} for {}", balance.value, token, account);
                self.events.emit(SyncEvent::BalanceSynced { balance });
            }
            Err(error) => {
                warn!("Balance sync for {} failed: {}", token, error);
                self.events.emit(SyncEvent::BalanceSyncFailed {
                    token: token.clone(),
                    error,
                });
            }
        }
    }

    async fn fetch_and_store(
        &self,
        account: &str,
        token: &TokenId,
    ) -> Result<Option<Balance>, KitError> {
        if self.events.is_closed() {
            return Ok(None);
        }
        let value = with_retry(&self.retry, "balance fetch", || {
            self.chain
                .get_balance(account, &token.contract, &token.symbol)
        })
        .await?;

        let balance = Balance {
            account: account.to_string(),
            contract: token.contract.clone(),
            symbol: token.symbol.clone(),
            value,
        };
        if self.events.is_closed() {
            return Ok(None);
        }
        self.storage.save_balance(&balance).await?;
        Ok(Some(balance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainError;
    use crate::storage::MemoryStorage;
    use crate::test_support::MockChainClient;

    fn manager(
        chain: Arc<MockChainClient>,
        storage: Arc<MemoryStorage>,
    ) -> (
        BalanceSyncManager,
        tokio::sync::mpsc::UnboundedReceiver<SyncEvent>,
    ) {
        let (sink, rx) = EventSink::channel();
        (
            BalanceSyncManager::new(storage, chain, sink, RetryPolicy::default()),
            rx,
        )
    }

    #[tokio::test]
    async fn test_sync_persists_and_reports() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance("eosio.token", "EOS", "12.3456");
        let storage = Arc::new(MemoryStorage::new());
        let (manager, mut rx) = manager(chain, storage.clone());
        let token = TokenId::new("eosio.token", "EOS");

        manager.sync("alice", &token).await;

        match rx.try_recv().expect("one event") {
            SyncEvent::BalanceSynced { balance } => {
                assert_eq!(balance.value.to_string(), "12.3456");
                assert_eq!(balance.token_id(), token);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());

        let cached = manager
            .cached_balance("alice", &token)
            .await
            .expect("persisted");
        assert_eq!(cached.value.to_string(), "12.3456");
    }

    #[tokio::test]
    async fn test_failure_reports_once_and_keeps_cache() {
        let chain = Arc::new(MockChainClient::new());
        chain.fail_balance_with(Some(ChainError::Network("timeout".to_string())));
        let storage = Arc::new(MemoryStorage::new());
        let (manager, mut rx) = manager(chain, storage);
        let token = TokenId::new("eosio.token", "EOS");

        manager.sync("alice", &token).await;

        match rx.try_recv().expect("one event") {
            SyncEvent::BalanceSyncFailed { token: failed, error } => {
                assert_eq!(failed, token);
                assert_eq!(error, KitError::Network("timeout".to_string()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
        assert!(manager.cached_balance("alice", &token).await.is_none());
    }

    #[tokio::test]
    async fn test_closed_sink_skips_persisting() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_balance("eosio.token", "EOS", "12.3456");
        let gate = chain.hold_balances();
        let storage = Arc::new(MemoryStorage::new());
        let (manager, mut rx) = manager(chain, storage);
        let token = TokenId::new("eosio.token", "EOS");

        let task = {
            let manager = manager.clone();
            let token = token.clone();
            tokio::spawn(async move { manager.sync("alice", &token).await })
        };
        tokio::task::yield_now().await;
        manager.events.close();
        gate.add_permits(1);
        task.await.expect("sync task");

        assert!(rx.try_recv().is_err());
        assert!(manager.cached_balance("alice", &token).await.is_none());
    }
}
