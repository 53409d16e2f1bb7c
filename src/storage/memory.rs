use super::{ActionQuery, Storage};
use crate::kit::{Action, Balance, KitError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Everything a storage instance holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
	#[serde(default)]
	pub balances: Vec<Balance>,
	/// Actions by account, then by sequence number.
	#[serde(default)]
	pub actions: BTreeMap<String, BTreeMap<u64, Action>>,
	#[serde(default)]
	pub irreversible_block_height: Option<u64>,
}

impl StorageSnapshot {
	pub fn balance(&self, account: &str, contract: &str, symbol: &str) -> Option<Balance> {
		self.balances
			.iter()
			.find(|b| b.account == account && b.contract == contract && b.symbol == symbol)
			.cloned()
	}

	pub fn upsert_balance(&mut self, balance: &Balance) {
		match self.balances.iter_mut().find(|b| {
			b.account == balance.account
				&& b.contract == balance.contract
				&& b.symbol == balance.symbol
		}) {
			Some(existing) => *existing = balance.clone(),
			None => self.balances.push(balance.clone()),
		}
	}

	pub fn query_actions(&self, query: &ActionQuery) -> Vec<Action> {
		let Some(log) = self.actions.get(&query.account) else {
			return Vec::new();
		};

		log.range(query.from_sequence.unwrap_or(0)..)
			.map(|(_, action)| action)
			.filter(|action| {
				query
					.contract
					.as_ref()
					.is_none_or(|contract| &action.contract == contract)
			})
			.filter(|action| {
				query
					.symbol
					.as_ref()
					.is_none_or(|symbol| action.symbol().as_ref() == Some(symbol))
			})
			.take(query.limit.unwrap_or(usize::MAX))
			.cloned()
			.collect()
	}

	pub fn last_action_sequence(&self, account: &str) -> Option<u64> {
		self.actions
			.get(account)
			.and_then(|log| log.keys().next_back().copied())
	}

	pub fn upsert_actions(&mut self, actions: &[Action]) {
		for action in actions {
			self.actions
				.entry(action.account.clone())
				.or_default()
				.insert(action.sequence, action.clone());
		}
	}
}

/// Storage kept entirely in memory. Suitable for tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryStorage {
	snapshot: Mutex<StorageSnapshot>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
		Self {
			snapshot: Mutex::new(snapshot),
		}
	}

	fn with<R>(&self, f: impl FnOnce(&mut StorageSnapshot) -> R) -> R {
		let mut guard = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
		f(&mut guard)
	}
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
	async fn get_balance(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Option<Balance>, KitError> {
		Ok(self.with(|s| s.balance(account, contract, symbol)))
	}

	async fn save_balance(&self, balance: &Balance) -> Result<(), KitError> {
		self.with(|s| s.upsert_balance(balance));
		Ok(())
	}

	async fn get_actions(&self, query: &ActionQuery) -> Result<Vec<Action>, KitError> {
		Ok(self.with(|s| s.query_actions(query)))
	}

	async fn last_action_sequence(&self, account: &str) -> Result<Option<u64>, KitError> {
		Ok(self.with(|s| s.last_action_sequence(account)))
	}

	async fn save_actions(&self, actions: &[Action]) -> Result<(), KitError> {
		self.with(|s| s.upsert_actions(actions));
		Ok(())
	}

	async fn get_irreversible_block_height(&self) -> Result<Option<u64>, KitError> {
		Ok(self.with(|s| s.irreversible_block_height))
	}

	async fn save_irreversible_block_height(&self, height: u64) -> Result<(), KitError> {
		self.with(|s| s.irreversible_block_height = Some(height));
		Ok(())
	}
}
