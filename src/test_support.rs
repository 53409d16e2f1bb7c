//! Scriptable chain client used by the unit tests.

use crate::chain::{ActionsPage, ChainAction, ChainClient, ChainError, PushedTransaction};
use crate::kit::Action;
use crate::utils::{Amount, Asset};

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const OVERDRAWN_BODY: &str = r#"{"code":500,"message":"Internal Service Error","error":{"code":3050003,"name":"eosio_assert_message_exception","what":"eosio_assert_message assertion failure","details":[{"message":"assertion failure with message: overdrawn balance","file":"wasm_interface.cpp","line_number":1,"method":"eosio_assert"}]}}"#;

#[derive(Default)]
struct MockState {
	balances: HashMap<(String, String), Amount>,
	actions: Vec<Action>,
	last_irreversible_block: u64,
	accounts: HashSet<String>,
	balance_error: Option<ChainError>,
	actions_error: Option<ChainError>,
	broadcast_error: Option<ChainError>,
	next_transaction: u64,
	broadcasts: Vec<Vec<ChainAction>>,
}

#[derive(Default)]
pub struct MockChainClient {
	state: Mutex<MockState>,
	balance_gate: Mutex<Option<Arc<Semaphore>>>,
	actions_gate: Mutex<Option<Arc<Semaphore>>>,
	pub balance_calls: AtomicUsize,
	pub action_calls: AtomicUsize,
	pub broadcast_calls: AtomicUsize,
}

impl MockChainClient {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
		self.state.lock().expect("mock state lock")
	}

	pub fn set_balance(&self, contract: &str, symbol: &str, value: &str) {
		self.state().balances.insert(
			(contract.to_string(), symbol.to_string()),
			value.parse().expect("valid amount"),
		);
	}

	pub fn balance(&self, contract: &str, symbol: &str) -> Option<Amount> {
		self.state()
			.balances
			.get(&(contract.to_string(), symbol.to_string()))
			.copied()
	}

	pub fn add_account(&self, account: &str) {
		self.state().accounts.insert(account.to_string());
	}

	pub fn set_last_irreversible_block(&self, height: u64) {
		self.state().last_irreversible_block = height;
	}

	pub fn push_transfer(&self, account: &str, sequence: u64, contract: &str, quantity: &str) {
		self.state().actions.push(Action {
			account: account.to_string(),
			sequence,
			block_number: 1_000 + sequence,
			block_time: None,
			transaction_id: format!("{:064x}", sequence),
			contract: contract.to_string(),
			name: "transfer".to_string(),
			data: json!({"from": "bob", "to": account, "quantity": quantity, "memo": ""}),
		});
	}

	pub fn fail_balance_with(&self, error: Option<ChainError>) {
		self.state().balance_error = error;
	}

	pub fn fail_actions_with(&self, error: Option<ChainError>) {
		self.state().actions_error = error;
	}

	pub fn fail_broadcast_with(&self, error: Option<ChainError>) {
		self.state().broadcast_error = error;
	}

	/// Hold every balance fetch until permits are added to the returned semaphore.
	pub fn hold_balances(&self) -> Arc<Semaphore> {
		let gate = Arc::new(Semaphore::new(0));
		*self.balance_gate.lock().expect("gate lock") = Some(gate.clone());
		gate
	}

	/// Hold every action page fetch until permits are added to the returned semaphore.
	pub fn hold_actions(&self) -> Arc<Semaphore> {
		let gate = Arc::new(Semaphore::new(0));
		*self.actions_gate.lock().expect("gate lock") = Some(gate.clone());
		gate
	}

	pub fn broadcasts(&self) -> Vec<Vec<ChainAction>> {
		self.state().broadcasts.clone()
	}
}

#[async_trait]
impl ChainClient for MockChainClient {
	async fn get_balance(
		&self,
		_account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Amount, ChainError> {
		self.balance_calls.fetch_add(1, Ordering::SeqCst);
		let gate = self.balance_gate.lock().expect("gate lock").clone();
		if let Some(gate) = gate {
			gate.acquire().await.expect("gate open").forget();
		}

		let state = self.state();
		if let Some(e) = &state.balance_error {
			return Err(e.clone());
		}
		Ok(state
			.balances
			.get(&(contract.to_string(), symbol.to_string()))
			.copied()
			.unwrap_or_default())
	}

	async fn get_actions(
		&self,
		account: &str,
		cursor: u64,
		page_size: u32,
	) -> Result<ActionsPage, ChainError> {
		self.action_calls.fetch_add(1, Ordering::SeqCst);
		let gate = self.actions_gate.lock().expect("gate lock").clone();
		if let Some(gate) = gate {
			gate.acquire().await.expect("gate open").forget();
		}

		let state = self.state();
		if let Some(e) = &state.actions_error {
			return Err(e.clone());
		}

		let mut matching: Vec<Action> = state
			.actions
			.iter()
			.filter(|a| a.account == account && a.sequence >= cursor)
			.cloned()
			.collect();
		matching.sort_by_key(|a| a.sequence);

		let has_more = matching.len() > page_size as usize;
		matching.truncate(page_size as usize);
		let next_cursor = if has_more {
			matching.last().map(|a| a.sequence + 1)
		} else {
			None
		};

		Ok(ActionsPage {
			actions: matching,
			next_cursor,
			last_irreversible_block: state.last_irreversible_block,
		})
	}

	async fn validate_account(&self, account: &str) -> Result<bool, ChainError> {
		Ok(self.state().accounts.contains(account))
	}

	async fn sign_and_broadcast(
		&self,
		actions: Vec<ChainAction>,
	) -> Result<PushedTransaction, ChainError> {
		self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
		// Give callers a chance to observe the call as in flight.
		tokio::time::sleep(Duration::from_millis(1)).await;

		let mut state = self.state();
		state.broadcasts.push(actions.clone());
		if let Some(e) = &state.broadcast_error {
			return Err(e.clone());
		}

		for action in &actions {
			if action.name != "transfer" {
				continue;
			}
			let asset: Asset = action.data["quantity"]
				.as_str()
				.and_then(|q| q.parse().ok())
				.ok_or_else(|| ChainError::Serialization("bad quantity".to_string()))?;
			let key = (action.contract.clone(), asset.symbol.clone());
			let current = state.balances.get(&key).copied().unwrap_or_default();
			if asset.amount > current {
				return Err(ChainError::Rpc {
					status: 500,
					body: OVERDRAWN_BODY.to_string(),
				});
			}
			let rest = current
				.checked_sub(&asset.amount)
				.ok_or_else(|| ChainError::Serialization("overflow".to_string()))?;
			state.balances.insert(key, rest);
		}

		state.next_transaction += 1;
		let transaction_id = format!("{:064x}", state.next_transaction);
		Ok(PushedTransaction {
			processed: json!({"id": transaction_id, "receipt": {"status": "executed"}}),
			transaction_id,
		})
	}
}
