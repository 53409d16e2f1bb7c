//! Wallet-side synchronization and transaction submission for EOSIO accounts.
//!
//! A `SyncOrchestrator` keeps the balances and action history of registered tokens current for
//! one account, tracks the chain's irreversible block and submits transfers and custom actions.
//! The chain and the persistence layer are injected through the `ChainClient` and `Storage`
//! traits.

pub mod chain;
pub mod config;
pub mod kit;
pub mod storage;
pub mod transaction;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use chain::{ChainClient, ChainError, HttpChainClient, TransactionSigner};
pub use config::{KitConfig, NetworkType, RetryPolicy};
pub use kit::sync::events::KitNotification;
pub use kit::{
	BackendError, BackendErrorDetail, KitError, StatusInfo, SyncOrchestrator, SyncState, Token,
	TokenId, Transaction,
};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use utils::{Amount, Asset};
