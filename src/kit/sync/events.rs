//! Event system for wallet synchronization.
//!
//! This module defines the events the sync managers emit towards the orchestrator and the
//! notifications the orchestrator republishes to subscribers.
//!
//! Managers never touch token state. They push tagged `SyncEvent`s into an `EventSink`; the
//! orchestrator drains that channel on a single task, which makes it the only writer of token
//! balances and sync states. What subscribers see is a `KitNotification` published on a
//! `NotificationBus`, a broadcast channel where slow receivers skip ahead to the newest values.

use crate::kit::{Action, Balance, KitError, SyncState, TokenId, Transaction};
use crate::utils::Amount;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Events emitted by the sync managers
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A balance sync for the token was dispatched
    BalanceSyncStarted { token: TokenId },
    /// A balance was fetched and persisted
    BalanceSynced { balance: Balance },
    /// Fetching or persisting a balance failed
    BalanceSyncFailed { token: TokenId, error: KitError },
    /// New actions were persisted, in ascending sequence order
    ActionsSynced { account: String, actions: Vec<Action> },
    /// The chain reported its last irreversible block
    IrreversibleBlockChanged { height: u64 },
    /// An action sync pass ended successfully
    ActionSyncFinished { account: String, synced: usize },
    /// An action sync pass ended with an error
    ActionSyncFailed { account: String, error: KitError },
}

/// Sending half of the manager → orchestrator channel.
///
/// Clones share a close flag. Once the orchestrator closes the sink, managers stop requesting
/// pages and stop persisting, and further events are dropped.
#[derive(Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<SyncEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                closed: Arc::new(AtomicBool::new(false)),
            },
            receiver,
        )
    }

    /// Emit an event. After the sink is closed the event is dropped.
    pub fn emit(&self, event: SyncEvent) {
        if self.is_closed() {
            debug!("Dropping sync event, sink is closed: {:?}", event);
            return;
        }
        if let Err(e) = self.sender.send(event) {
            debug!("Dropping sync event, orchestrator is gone: {:?}", e.0);
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.sender.is_closed()
    }
}

/// Notifications republished to external subscribers
#[derive(Debug, Clone)]
pub enum KitNotification {
    BalanceChanged {
        token: TokenId,
        balance: Amount,
    },
    SyncStateChanged {
        token: TokenId,
        state: SyncState,
    },
    /// Newly synced transactions for one token
    TransactionsChanged {
        token: TokenId,
        transactions: Vec<Transaction>,
    },
    IrreversibleBlockChanged {
        height: u64,
    },
}

/// Broadcast bus for `KitNotification`s.
///
/// Subscribers only receive notifications published after they subscribed.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<KitNotification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KitNotification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: KitNotification) {
        // Publishing without subscribers is not an error.
        let _ = self.sender.send(notification);
    }
}
