//! Sync orchestrator and public facade of the kit.
//!
//! This module defines the `SyncOrchestrator`, which owns the registered token set for one
//! account and coordinates everything that keeps it current:
//! - dispatching balance syncs per token and action syncs for the account
//! - guaranteeing at most one in-flight sync per token and per account
//! - applying manager events to token state on a single event loop
//! - republishing balance, state, transaction and irreversible block notifications
//! - submitting transactions and scheduling the delayed balance re-sync that follows them
//!
//! Managers report through an `EventSink`. The event loop spawned in `new` is the only place
//! that writes token balances, sync states and the irreversible block watermark.

use crate::chain::ChainClient;
use crate::config::KitConfig;
use crate::kit::sync::{
    action_sync::ActionSyncManager,
    balance_sync::BalanceSyncManager,
    events::{EventSink, KitNotification, NotificationBus, SyncEvent},
};
use crate::kit::{Action, KitError, SyncState, Token, TokenId, Transaction};
use crate::storage::Storage;
use crate::transaction::TransactionManager;
use crate::utils::Amount;

use itertools::Itertools;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fingerprint of a sync that may be in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SyncKey {
    Balance(TokenId),
    Actions(String),
}

/// Diagnostic snapshot returned by `SyncOrchestrator::status_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub irreversible_block_height: Option<u64>,
    /// Coarsest sync state across registered tokens.
    pub sync_state: String,
    pub rpc_host: String,
}

impl StatusInfo {
    /// Labelled entries in display order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "Irreversible Block Height",
                self.irreversible_block_height
                    .map(|h| h.to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
            ),
            ("Sync State", self.sync_state.clone()),
            ("RPC Host", self.rpc_host.clone()),
        ]
    }
}

struct Inner {
    account: String,
    config: KitConfig,

    // Services
    balance_sync: BalanceSyncManager,
    action_sync: ActionSyncManager,
    transaction_manager: TransactionManager,

    events: EventSink,
    notifications: NotificationBus,

    tokens: RwLock<Vec<Arc<Token>>>,
    in_flight: Mutex<HashSet<SyncKey>>,
    irreversible_block_height: RwLock<Option<u64>>,
    stopped: AtomicBool,
    /// Event loop, periodic refresh loop, running syncs and pending re-sync timers.
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Coordinates balance and action synchronization for one account.
///
/// Cheap to clone; all clones drive the same registry.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Wire the managers around `storage` and `chain` and start the event loop.
    ///
    /// The irreversible block watermark is restored from storage.
    pub async fn new(
        account: impl Into<String>,
        storage: Arc<dyn Storage>,
        chain: Arc<dyn ChainClient>,
        config: KitConfig,
    ) -> Self {
        let account = account.into();
        let (events, receiver) = EventSink::channel();

        let balance_sync = BalanceSyncManager::new(
            storage.clone(),
            chain.clone(),
            events.clone(),
            config.retry.clone(),
        );
        let action_sync = ActionSyncManager::new(
            storage,
            chain.clone(),
            events.clone(),
            config.action_page_size,
            config.max_action_pages_per_sync,
            config.retry.clone(),
        );
        let transaction_manager = TransactionManager::new(chain, config.system_contract.clone());
        let irreversible_block_height = action_sync.irreversible_block_height().await;

        info!(
            "Starting sync orchestrator for {} on {} ({})",
            account, config.network, config.rpc_host
        );

        let inner = Arc::new(Inner {
            account,
            notifications: NotificationBus::new(config.notification_capacity),
            config,
            balance_sync,
            action_sync,
            transaction_manager,
            events,
            tokens: RwLock::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            irreversible_block_height: RwLock::new(irreversible_block_height),
            stopped: AtomicBool::new(false),
            background: Mutex::new(Vec::new()),
        });

        let event_loop = tokio::spawn(run_event_loop(Arc::downgrade(&inner), receiver));
        inner.track(event_loop);

        Self { inner }
    }

    pub fn account(&self) -> &str {
        &self.inner.account
    }

    /// Register `(contract, symbol)` and dispatch its first balance sync.
    ///
    /// Registering a pair twice returns the existing token.
    pub async fn register(
        &self,
        contract: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Arc<Token> {
        let id = TokenId::new(contract, symbol);
        if let Some(token) = self.inner.find_token(&id) {
            return token;
        }

        let cached = self
            .inner
            .balance_sync
            .cached_balance(&self.inner.account, &id)
            .await
            .map(|b| b.value)
            .unwrap_or_default();

        let token = {
            let mut tokens = self.inner.tokens.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = tokens.iter().find(|t| t.id() == &id) {
                return existing.clone();
            }
            let token = Arc::new(Token::new(
                id.clone(),
                cached,
                self.inner.config.notification_capacity,
            ));
            tokens.push(token.clone());
            token
        };

        info!("Registered {} with cached balance {}", id, cached);
        self.inner.dispatch_balance_sync(id);
        token
    }

    /// Remove `token` from the registry. Syncs already in flight for it complete as no-ops.
    pub fn unregister(&self, token: &Token) {
        let mut tokens = self.inner.tokens.write().unwrap_or_else(PoisonError::into_inner);
        let before = tokens.len();
        tokens.retain(|t| t.id() != token.id());
        if tokens.len() < before {
            info!("Unregistered {}", token.id());
        }
    }

    pub fn tokens(&self) -> Vec<Arc<Token>> {
        self.inner.tokens_snapshot()
    }

    /// Dispatch one balance sync per registered token and one action sync for the account.
    ///
    /// Keys that already have a sync in flight are skipped.
    pub fn refresh(&self) {
        self.inner.refresh();
    }

    /// Refresh now, and keep refreshing every `sync_interval` when one is configured.
    pub fn start(&self) {
        let Some(period) = self.inner.config.sync_interval else {
            self.inner.refresh();
            return;
        };

        info!("Refreshing every {:?}", period);
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.is_stopped() {
                    break;
                }
                inner.refresh();
            }
        });
        self.inner.track(handle);
    }

    /// Halt the event loop, the refresh loop, running syncs and pending re-syncs.
    ///
    /// Running syncs are aborted at their next await and, through the closed event sink, never
    /// request another page or write to storage. Chain client and storage handles are released
    /// once the last clone of the orchestrator is dropped.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.events.close();
        let handles: Vec<_> = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
        info!("Sync orchestrator for {} stopped", self.inner.account);
    }

    /// Transfer `amount` of `token` to `to`, then re-sync the token's balance after a delay.
    pub async fn send(
        &self,
        token: &Token,
        to: &str,
        amount: Amount,
        memo: &str,
    ) -> Result<String, KitError> {
        self.inner.ensure_running()?;
        let id = self
            .inner
            .transaction_manager
            .send(&self.inner.account, token.id(), to, amount, memo)
            .await?;
        self.inner.schedule_balance_resync(vec![token.id().clone()]);
        Ok(id)
    }

    /// Create `new_account` paid for by this account. Every registered token is re-synced.
    pub async fn send_account_creation(
        &self,
        new_account: &str,
        public_key: &str,
    ) -> Result<String, KitError> {
        self.inner.ensure_running()?;
        let id = self
            .inner
            .transaction_manager
            .send_account_creation(&self.inner.account, new_account, public_key)
            .await?;
        let all = self
            .inner
            .tokens_snapshot()
            .iter()
            .map(|t| t.id().clone())
            .collect();
        self.inner.schedule_balance_resync(all);
        Ok(id)
    }

    /// Submit `action_name` on `token`'s contract and return the processed trace.
    pub async fn send_action(
        &self,
        action_name: &str,
        token: &Token,
        payload_json: &str,
    ) -> Result<serde_json::Value, KitError> {
        self.inner.ensure_running()?;
        let processed = self
            .inner
            .transaction_manager
            .send_action(&self.inner.account, action_name, token.contract(), payload_json)
            .await?;
        self.inner.schedule_balance_resync(vec![token.id().clone()]);
        Ok(processed)
    }

    /// Like `send_action`, returning the transaction id.
    pub async fn send_json(
        &self,
        action_name: &str,
        token: &Token,
        payload_json: &str,
    ) -> Result<String, KitError> {
        self.inner.ensure_running()?;
        let id = self
            .inner
            .transaction_manager
            .send_json(&self.inner.account, action_name, token.contract(), payload_json)
            .await?;
        self.inner.schedule_balance_resync(vec![token.id().clone()]);
        Ok(id)
    }

    /// Locally synced transactions of `token` in ascending sequence order.
    pub async fn transactions(
        &self,
        token: &Token,
        from_sequence: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>, KitError> {
        self.inner
            .action_sync
            .get_actions(&self.inner.account, token.id(), from_sequence, limit)
            .await
    }

    pub async fn validate(&self, account: &str) -> Result<(), KitError> {
        self.inner.action_sync.validate_account(account).await
    }

    pub fn irreversible_block_height(&self) -> Option<u64> {
        self.inner.irreversible_block_height()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KitNotification> {
        self.inner.notifications.subscribe()
    }

    pub fn status_info(&self) -> StatusInfo {
        let states: Vec<SyncState> = self
            .inner
            .tokens_snapshot()
            .iter()
            .map(|t| t.sync_state())
            .collect();

        let coarsest = if states.iter().any(|s| *s == SyncState::Syncing) {
            SyncState::Syncing.name()
        } else if let Some(failed) = states.iter().find(|s| matches!(s, SyncState::NotSynced(_))) {
            failed.name()
        } else {
            SyncState::Synced.name()
        };

        StatusInfo {
            irreversible_block_height: self.inner.irreversible_block_height(),
            sync_state: coarsest.to_string(),
            rpc_host: self.inner.config.rpc_host.clone(),
        }
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), KitError> {
        if self.is_stopped() {
            Err(KitError::Stopped)
        } else {
            Ok(())
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    fn tokens_snapshot(&self) -> Vec<Arc<Token>> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn find_token(&self, id: &TokenId) -> Option<Arc<Token>> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|t| t.id() == id)
            .cloned()
    }

    fn irreversible_block_height(&self) -> Option<u64> {
        *self
            .irreversible_block_height
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `key`. Returns false when a sync for it is already running.
    fn begin(&self, key: SyncKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }

    fn finish(&self, key: &SyncKey) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn refresh(&self) {
        if self.is_stopped() {
            debug!("Ignoring refresh, orchestrator is stopped");
            return;
        }
        let ids: Vec<TokenId> = self.tokens_snapshot().iter().map(|t| t.id().clone()).collect();
        for id in ids {
            self.dispatch_balance_sync(id);
        }
        self.dispatch_action_sync();
    }

    fn dispatch_balance_sync(&self, id: TokenId) -> bool {
        if self.is_stopped() || !self.begin(SyncKey::Balance(id.clone())) {
            debug!("Balance sync for {} already in flight", id);
            return false;
        }

        self.events
            .emit(SyncEvent::BalanceSyncStarted { token: id.clone() });
        let manager = self.balance_sync.clone();
        let account = self.account.clone();
        self.track(tokio::spawn(async move { manager.sync(&account, &id).await }));
        true
    }

    fn dispatch_action_sync(&self) -> bool {
        if self.is_stopped() || !self.begin(SyncKey::Actions(self.account.clone())) {
            debug!("Action sync for {} already in flight", self.account);
            return false;
        }

        let manager = self.action_sync.clone();
        let account = self.account.clone();
        self.track(tokio::spawn(async move { manager.sync(&account).await }));
        true
    }

    /// Re-sync `ids` once `balance_resync_delay` has passed, skipping tokens unregistered since.
    fn schedule_balance_resync(self: &Arc<Self>, ids: Vec<TokenId>) {
        if ids.is_empty() {
            return;
        }
        let delay = self.config.balance_resync_delay;
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            for id in ids {
                if inner.find_token(&id).is_some() {
                    inner.dispatch_balance_sync(id);
                }
            }
        });
        self.track(handle);
    }

    fn set_sync_state(&self, token: &Token, state: SyncState) {
        if token.set_sync_state(state.clone()) {
            self.notifications.publish(KitNotification::SyncStateChanged {
                token: token.id().clone(),
                state,
            });
        }
    }

    async fn handle_event(&self, event: SyncEvent) {
        match event {
            SyncEvent::BalanceSyncStarted { token } => {
                if let Some(token) = self.find_token(&token) {
                    self.set_sync_state(&token, SyncState::Syncing);
                }
            }
            SyncEvent::BalanceSynced { balance } => {
                let id = balance.token_id();
                self.finish(&SyncKey::Balance(id.clone()));
                let Some(token) = self.find_token(&id) else {
                    debug!("Dropping balance for unregistered {}", id);
                    return;
                };
                if token.set_balance(balance.value) {
                    self.notifications.publish(KitNotification::BalanceChanged {
                        token: id,
                        balance: balance.value,
                    });
                }
                self.set_sync_state(&token, SyncState::Synced);
            }
            SyncEvent::BalanceSyncFailed { token, error } => {
                self.finish(&SyncKey::Balance(token.clone()));
                if let Some(token) = self.find_token(&token) {
                    self.set_sync_state(&token, SyncState::NotSynced(error));
                }
            }
            SyncEvent::ActionsSynced { account, actions } => {
                if account == self.account {
                    self.publish_transactions(actions);
                }
            }
            SyncEvent::IrreversibleBlockChanged { height } => {
                self.update_irreversible_block(height).await;
            }
            SyncEvent::ActionSyncFinished { account, synced } => {
                debug!("Action sync for {} finished with {} new actions", account, synced);
                self.finish(&SyncKey::Actions(account));
            }
            SyncEvent::ActionSyncFailed { account, error } => {
                warn!("Action sync for {} failed: {}", account, error);
                self.finish(&SyncKey::Actions(account));
            }
        }
    }

    /// Group `actions` by token and notify each registered one.
    fn publish_transactions(&self, actions: Vec<Action>) {
        let by_token = actions
            .iter()
            .filter_map(|a| a.symbol().map(|symbol| (TokenId::new(a.contract.clone(), symbol), a)))
            .into_group_map_by(|(id, _)| id.clone());

        for (id, entries) in by_token {
            let Some(token) = self.find_token(&id) else {
                continue;
            };
            let transactions: Vec<Transaction> =
                entries.into_iter().map(|(_, a)| Transaction::from(a)).collect();

            debug!("{} new transactions for {}", transactions.len(), id);
            token.publish_transactions(transactions.clone());
            self.notifications
                .publish(KitNotification::TransactionsChanged { token: id, transactions });
        }
    }

    async fn update_irreversible_block(&self, height: u64) {
        {
            let mut current = self
                .irreversible_block_height
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match *current {
                Some(known) if height == known => return,
                Some(known) if height < known => {
                    warn!(
                        "Ignoring irreversible block {} below the known watermark {}",
                        height, known
                    );
                    return;
                }
                _ => *current = Some(height),
            }
        }

        if let Err(e) = self.action_sync.save_irreversible_block_height(height).await {
            warn!("Failed to persist irreversible block {}: {}", height, e);
        }
        self.notifications
            .publish(KitNotification::IrreversibleBlockChanged { height });
    }
}

async fn run_event_loop(inner: Weak<Inner>, mut receiver: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = receiver.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.is_stopped() {
            break;
        }
        inner.handle_event(event).await;
    }
    debug!("Sync event loop exited");
}
