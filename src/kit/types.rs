use crate::kit::KitError;
use crate::utils::{Amount, Asset};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

/// Identity of a registered token: the issuing contract and the symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId {
	pub contract: String,
	pub symbol: String,
}

impl TokenId {
	pub fn new(contract: impl Into<String>, symbol: impl Into<String>) -> Self {
		Self {
			contract: contract.into(),
			symbol: symbol.into(),
		}
	}
}

impl fmt::Display for TokenId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}@{}", self.symbol, self.contract)
	}
}

/// Sync state of a single token.
///
/// `Syncing` is entered when a sync attempt is dispatched and resolves to `Synced` or
/// `NotSynced` when that attempt completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
	Synced,
	Syncing,
	NotSynced(KitError),
}

impl SyncState {
	pub fn name(&self) -> &'static str {
		match self {
			SyncState::Synced => "Synced",
			SyncState::Syncing => "Syncing",
			SyncState::NotSynced(_) => "Not Synced",
		}
	}
}

impl fmt::Display for SyncState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Last balance persisted for `(account, contract, symbol)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
	pub account: String,
	pub contract: String,
	pub symbol: String,
	pub value: Amount,
}

impl Balance {
	pub fn token_id(&self) -> TokenId {
		TokenId::new(self.contract.clone(), self.symbol.clone())
	}
}

/// A raw action from the account's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
	/// Account whose history this action belongs to.
	pub account: String,
	/// Account-scoped sequence number assigned by the chain.
	pub sequence: u64,
	pub block_number: u64,
	pub block_time: Option<DateTime<Utc>>,
	pub transaction_id: String,
	/// Contract that executed the action.
	pub contract: String,
	pub name: String,
	pub data: serde_json::Value,
}

impl Action {
	/// The asset moved by the action, if its payload carries a `quantity`.
	pub fn asset(&self) -> Option<Asset> {
		self.data
			.get("quantity")
			.and_then(|q| q.as_str())
			.and_then(|q| q.parse().ok())
	}

	pub fn symbol(&self) -> Option<String> {
		self.asset().map(|asset| asset.symbol)
	}
}

/// Display projection of one action for a token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
	pub id: String,
	pub sequence: u64,
	pub block_number: u64,
	pub date: Option<DateTime<Utc>>,
	pub contract: String,
	pub action_name: String,
	pub from: Option<String>,
	pub to: Option<String>,
	pub quantity: Option<Amount>,
	pub symbol: Option<String>,
	pub memo: Option<String>,
}

impl From<&Action> for Transaction {
	fn from(action: &Action) -> Self {
		let field = |name: &str| {
			action
				.data
				.get(name)
				.and_then(|v| v.as_str())
				.map(str::to_string)
		};
		let asset = action.asset();

		Self {
			id: action.transaction_id.clone(),
			sequence: action.sequence,
			block_number: action.block_number,
			date: action.block_time,
			contract: action.contract.clone(),
			action_name: action.name.clone(),
			from: field("from"),
			to: field("to"),
			quantity: asset.as_ref().map(|a| a.amount),
			symbol: asset.map(|a| a.symbol),
			memo: field("memo"),
		}
	}
}

struct TokenState {
	balance: Amount,
	sync_state: SyncState,
}

/// A registered token.
///
/// Handed out as `Arc<Token>`; registering the same pair twice yields the same instance. Balance
/// and sync state are written only by the orchestrator's event loop.
pub struct Token {
	id: TokenId,
	state: RwLock<TokenState>,
	transactions: broadcast::Sender<Vec<Transaction>>,
}

impl Token {
	pub(crate) fn new(id: TokenId, balance: Amount, capacity: usize) -> Self {
		let (transactions, _) = broadcast::channel(capacity.max(1));
		Self {
			id,
			state: RwLock::new(TokenState {
				balance,
				sync_state: SyncState::Syncing,
			}),
			transactions,
		}
	}

	pub fn id(&self) -> &TokenId {
		&self.id
	}

	pub fn contract(&self) -> &str {
		&self.id.contract
	}

	pub fn symbol(&self) -> &str {
		&self.id.symbol
	}

	pub fn balance(&self) -> Amount {
		self.state.read().unwrap_or_else(PoisonError::into_inner).balance
	}

	pub fn sync_state(&self) -> SyncState {
		self.state
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.sync_state
			.clone()
	}

	/// Transactions for this token as they are synced.
	pub fn subscribe_transactions(&self) -> broadcast::Receiver<Vec<Transaction>> {
		self.transactions.subscribe()
	}

	pub(crate) fn set_balance(&self, balance: Amount) -> bool {
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		let changed = state.balance != balance || state.balance.precision() != balance.precision();
		state.balance = balance;
		changed
	}

	/// Returns whether the state actually changed.
	pub(crate) fn set_sync_state(&self, sync_state: SyncState) -> bool {
		let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
		if state.sync_state == sync_state {
			return false;
		}
		state.sync_state = sync_state;
		true
	}

	pub(crate) fn publish_transactions(&self, transactions: Vec<Transaction>) {
		// No subscribers is fine.
		let _ = self.transactions.send(transactions);
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Token")
			.field("id", &self.id)
			.field("balance", &self.balance())
			.field("sync_state", &self.sync_state())
			.finish()
	}
}
