//! Persistence for balances, action history and the irreversible block watermark.
//!
//! The orchestrator and its managers only talk to the `Storage` trait. Two implementations are
//! provided: `MemoryStorage`, and `FileStorage` which keeps one JSON snapshot per
//! `(network, walletId)` pair so restarts resume from the last synced state.

/// JSON snapshot file storage
mod file;
/// In-memory storage and the shared snapshot model
mod memory;

pub use file::FileStorage;
pub use memory::{MemoryStorage, StorageSnapshot};

use crate::kit::{Action, Balance, KitError};

/// Filter for reading persisted actions.
#[derive(Debug, Clone, Default)]
pub struct ActionQuery {
	pub account: String,
	/// Only actions executed by this contract.
	pub contract: Option<String>,
	/// Only actions whose payload quantity carries this symbol.
	pub symbol: Option<String>,
	/// Lowest sequence number to include. Defaults to the earliest available.
	pub from_sequence: Option<u64>,
	pub limit: Option<usize>,
}

impl ActionQuery {
	pub fn for_account(account: impl Into<String>) -> Self {
		Self {
			account: account.into(),
			..Default::default()
		}
	}
}

/// Storage interface consumed by the kit.
///
/// Writes are upserts: balances are keyed by `(account, contract, symbol)` and actions by
/// `(account, sequence)`.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
	async fn get_balance(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Option<Balance>, KitError>;

	async fn save_balance(&self, balance: &Balance) -> Result<(), KitError>;

	/// Matching actions in ascending sequence order.
	async fn get_actions(&self, query: &ActionQuery) -> Result<Vec<Action>, KitError>;

	/// Highest persisted sequence number for `account`.
	async fn last_action_sequence(&self, account: &str) -> Result<Option<u64>, KitError>;

	async fn save_actions(&self, actions: &[Action]) -> Result<(), KitError>;

	async fn get_irreversible_block_height(&self) -> Result<Option<u64>, KitError>;

	async fn save_irreversible_block_height(&self, height: u64) -> Result<(), KitError>;
}
