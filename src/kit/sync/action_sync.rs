//! Action history synchronization and irreversible block tracking.

use crate::chain::ChainClient;
use crate::config::RetryPolicy;
use crate::kit::sync::events::{EventSink, SyncEvent};
use crate::kit::sync::progress_tracker::SyncProgressTracker;
use crate::kit::sync::retry::with_retry;
use crate::kit::{Action, KitError, TokenId, Transaction};
use crate::storage::{ActionQuery, Storage};

use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches an account's new actions page by page, persists them and reports them as events.
///
/// Every page response also carries the chain's last irreversible block, which is forwarded
/// whether or not the page had new actions.
#[derive(Clone)]
pub struct ActionSyncManager {
    storage: Arc<dyn Storage>,
    chain: Arc<dyn ChainClient>,
    events: EventSink,
    page_size: u32,
    max_pages: u32,
    retry: RetryPolicy,
}

impl ActionSyncManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        chain: Arc<dyn ChainClient>,
        events: EventSink,
        page_size: u32,
        max_pages: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            storage,
            chain,
            events,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            retry,
        }
    }

    /// Sync new actions of `account`.
    ///
    /// Ends with exactly one `ActionSyncFinished` or `ActionSyncFailed` event. Pages persisted
    /// before a failure stay persisted and have already been reported. Closing the event sink
    /// ends the pass before the next page request or write.
    pub async fn sync(&self, account: &str) {
        match self.sync_pages(account).await {
            Ok(synced) => self.events.emit(SyncEvent::ActionSyncFinished {
                account: account.to_string(),
                synced,
            }),
            Err(error) => {
                warn!("Action sync for {} failed: {}", account, error);
                self.events.emit(SyncEvent::ActionSyncFailed {
                    account: account.to_string(),
                    error,
                });
            }
        }
    }

    async fn sync_pages(&self, account: &str) -> Result<usize, KitError> {
        let last_sequence = self.storage.last_action_sequence(account).await?;
        let mut tracker = SyncProgressTracker::new(last_sequence, self.max_pages);

        while tracker.should_continue() {
            if self.events.is_closed() {
                debug!("Action sync for {} halted", account);
                break;
            }
            let cursor = tracker.cursor();
            debug!("Fetching actions for {} from cursor {}", account, cursor);

            let page = with_retry(&self.retry, "action fetch", || {
                self.chain.get_actions(account, cursor, self.page_size)
            })
            .await?;

            let mut actions: Vec<Action> = page
                .actions
                .into_iter()
                .filter(|a| a.sequence >= cursor)
                .collect();
            actions.sort_by_key(|a| a.sequence);
            actions.dedup_by_key(|a| a.sequence);

            if self.events.is_closed() {
                debug!("Action sync for {} halted", account);
                break;
            }
            if !actions.is_empty() {
                self.storage.save_actions(&actions).await?;
            }

            let sequences: Vec<u64> = actions.iter().map(|a| a.sequence).collect();
            tracker.record_page(&sequences, page.next_cursor, page.last_irreversible_block);

            self.events.emit(SyncEvent::IrreversibleBlockChanged {
                height: page.last_irreversible_block,
            });
            if !actions.is_empty() {
                self.events.emit(SyncEvent::ActionsSynced {
                    account: account.to_string(),
                    actions,
                });
            }
        }

        tracker.log_progress(account);
        Ok(tracker.get_stats().actions_synced)
    }

    /// Check that `account` exists on chain.
    pub async fn validate_account(&self, account: &str) -> Result<(), KitError> {
        if self.chain.validate_account(account).await? {
            Ok(())
        } else {
            Err(KitError::AccountNotFound(account.to_string()))
        }
    }

    /// Locally persisted transactions of `token` for `account`, in ascending sequence order.
    ///
    /// Never hits the chain.
    pub async fn get_actions(
        &self,
        account: &str,
        token: &TokenId,
        from_sequence: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, KitError> {
        let query = ActionQuery {
            account: account.to_string(),
            contract: Some(token.contract.clone()),
            symbol: Some(token.symbol.clone()),
            from_sequence,
            limit,
        };
        let actions = self.storage.get_actions(&query).await?;
        Ok(actions.iter().map(Transaction::from).collect())
    }

    pub async fn irreversible_block_height(&self) -> Option<u64> {
        match self.storage.get_irreversible_block_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!("Failed to read irreversible block height: {}", e);
                None
            }
        }
    }

    pub async fn save_irreversible_block_height(&self, height: u64) -> Result<(), KitError> {
        self.storage.save_irreversible_block_height(height).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainError;
    use crate::storage::MemoryStorage;
    use crate::test_support::MockChainClient;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn manager(
        chain: Arc<MockChainClient>,
        page_size: u32,
        max_pages: u32,
    ) -> (ActionSyncManager, UnboundedReceiver<SyncEvent>) {
        let (sink, rx) = EventSink::channel();
        let storage = Arc::new(MemoryStorage::new());
        (
            ActionSyncManager::new(
                storage,
                chain,
                sink,
                page_size,
                max_pages,
                RetryPolicy::default(),
            ),
            rx,
        )
    }

    fn drain(rx: &mut UnboundedReceiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn synced_sequences(events: &[SyncEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::ActionsSynced { actions, .. } => Some(actions),
                _ => None,
            })
            .flatten()
            .map(|a| a.sequence)
            .collect()
    }

    #[tokio::test]
    async fn test_pages_until_exhausted() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_last_irreversible_block(500);
        for seq in 0..7 {
            chain.push_transfer("alice", seq, "eosio.token", "1.0000 EOS");
        }
        let (manager, mut rx) = manager(chain.clone(), 3, 10);

        manager.sync("alice").await;
        let events = drain(&mut rx);

        assert_eq!(synced_sequences(&events), (0..7).collect::<Vec<_>>());
        assert_eq!(chain.action_calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            events.last(),
            Some(SyncEvent::ActionSyncFinished { synced: 7, .. })
        ));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SyncEvent::IrreversibleBlockChanged { height: 500 }))
        );
    }

    #[tokio::test]
    async fn test_resumes_from_cursor_without_duplicates() {
        let chain = Arc::new(MockChainClient::new());
        for seq in 0..4 {
            chain.push_transfer("alice", seq, "eosio.token", "1.0000 EOS");
        }
        let (manager, mut rx) = manager(chain.clone(), 10, 10);

        manager.sync("alice").await;
        drain(&mut rx);

        chain.push_transfer("alice", 4, "eosio.token", "2.0000 EOS");
        manager.sync("alice").await;
        let events = drain(&mut rx);
        assert_eq!(synced_sequences(&events), vec![4]);

        manager.sync("alice").await;
        let events = drain(&mut rx);
        assert!(synced_sequences(&events).is_empty());
        // The watermark is still forwarded when nothing is new.
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SyncEvent::IrreversibleBlockChanged { .. }))
        );
    }

    #[tokio::test]
    async fn test_page_limit_bounds_one_pass() {
        let chain = Arc::new(MockChainClient::new());
        for seq in 0..10 {
            chain.push_transfer("alice", seq, "eosio.token", "1.0000 EOS");
        }
        let (manager, mut rx) = manager(chain.clone(), 2, 2);

        manager.sync("alice").await;
        assert_eq!(synced_sequences(&drain(&mut rx)), vec![0, 1, 2, 3]);

        manager.sync("alice").await;
        assert_eq!(synced_sequences(&drain(&mut rx)), vec![4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_get_actions_filters_by_token() {
        let chain = Arc::new(MockChainClient::new());
        for seq in 0..120 {
            let quantity = if seq % 3 == 0 { "1.0000 JUNGLE" } else { "1.0000 EOS" };
            chain.push_transfer("alice", seq, "eosio.token", quantity);
        }
        let (manager, _rx) = manager(chain, 50, 10);
        manager.sync("alice").await;

        let token = TokenId::new("eosio.token", "EOS");
        let transactions = manager
            .get_actions("alice", &token, Some(100), Some(50))
            .await
            .expect("local read");

        assert!(!transactions.is_empty() && transactions.len() <= 50);
        assert!(transactions.iter().all(|t| t.sequence >= 100));
        assert!(transactions.iter().all(|t| t.symbol.as_deref() == Some("EOS")));
        assert!(transactions.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[tokio::test]
    async fn test_closed_sink_stops_paging() {
        let chain = Arc::new(MockChainClient::new());
        for seq in 0..10 {
            chain.push_transfer("alice", seq, "eosio.token", "1.0000 EOS");
        }
        let gate = chain.hold_actions();
        let (manager, mut rx) = manager(chain.clone(), 2, 10);

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.sync("alice").await })
        };
        while chain.action_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        manager.events.close();
        gate.add_permits(10);
        task.await.expect("sync task");

        assert_eq!(chain.action_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            manager.storage.last_action_sequence("alice").await.expect("read"),
            None
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let chain = Arc::new(MockChainClient::new());
        chain.fail_actions_with(Some(ChainError::Network("refused".to_string())));
        let (manager, mut rx) = manager(chain, 10, 10);

        manager.sync("alice").await;
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            SyncEvent::ActionSyncFailed { error: KitError::Network(_), .. }
        ));
    }

    #[tokio::test]
    async fn test_validate_account() {
        let chain = Arc::new(MockChainClient::new());
        chain.add_account("alice");
        let (manager, _rx) = manager(chain, 10, 10);

        assert!(manager.validate_account("alice").await.is_ok());
        assert_eq!(
            manager.validate_account("nobody").await,
            Err(KitError::AccountNotFound("nobody".to_string()))
        );
    }
}
