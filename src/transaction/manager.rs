//! Transaction submission.
//!
//! Builds single-action requests authorized by `account@active` and hands them to the chain
//! client's sign-and-broadcast path. A request is submitted at most once: a transfer that failed
//! in transit may still have landed, and resubmitting it could spend twice. Callers that want to
//! try again build a new request.

use crate::chain::{Authorization, ChainAction, ChainClient, PushedTransaction};
use crate::kit::{KitError, TokenId};
use crate::transaction::errors::translate_chain_error;
use crate::utils::{Amount, Asset};

use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub struct TransactionManager {
	chain: Arc<dyn ChainClient>,
	/// Contract owning `newaccount`.
	system_contract: String,
}

impl TransactionManager {
	pub fn new(chain: Arc<dyn ChainClient>, system_contract: impl Into<String>) -> Self {
		Self {
			chain,
			system_contract: system_contract.into(),
		}
	}

	/// Transfer `amount` of `token` from `account` to `to`. Returns the transaction id.
	pub async fn send(
		&self,
		account: &str,
		token: &TokenId,
		to: &str,
		amount: Amount,
		memo: &str,
	) -> Result<String, KitError> {
		let quantity = Asset::new(amount, token.symbol.clone());
		let action = ChainAction {
			contract: token.contract.clone(),
			name: "transfer".to_string(),
			authorization: vec![Authorization::active(account)],
			data: json!({
				"from": account,
				"to": to,
				"quantity": quantity.to_string(),
				"memo": memo,
			}),
		};

		info!("Sending {} from {} to {}", quantity, account, to);
		Ok(self.submit(action).await?.transaction_id)
	}

	/// Create `new_account` with `public_key` as the single owner and active key.
	pub async fn send_account_creation(
		&self,
		creator: &str,
		new_account: &str,
		public_key: &str,
	) -> Result<String, KitError> {
		let authority = json!({
			"threshold": 1,
			"keys": [{ "key": public_key, "weight": 1 }],
			"accounts": [],
			"waits": [],
		});
		let action = ChainAction {
			contract: self.system_contract.clone(),
			name: "newaccount".to_string(),
			authorization: vec![Authorization::active(creator)],
			data: json!({
				"creator": creator,
				"name": new_account,
				"owner": authority,
				"active": authority,
			}),
		};

		info!("Creating account {} by {}", new_account, creator);
		Ok(self.submit(action).await?.transaction_id)
	}

	/// Submit `action_name` on `contract` with a caller-supplied JSON payload.
	///
	/// Returns the chain's raw "processed" trace.
	pub async fn send_action(
		&self,
		account: &str,
		action_name: &str,
		contract: &str,
		payload_json: &str,
	) -> Result<serde_json::Value, KitError> {
		Ok(self
			.submit(Self::custom_action(account, action_name, contract, payload_json)?)
			.await?
			.processed)
	}

	/// Like `send_action` but returns only the transaction id.
	pub async fn send_json(
		&self,
		account: &str,
		action_name: &str,
		contract: &str,
		payload_json: &str,
	) -> Result<String, KitError> {
		Ok(self
			.submit(Self::custom_action(account, action_name, contract, payload_json)?)
			.await?
			.transaction_id)
	}

	fn custom_action(
		account: &str,
		action_name: &str,
		contract: &str,
		payload_json: &str,
	) -> Result<ChainAction, KitError> {
		let data: serde_json::Value = serde_json::from_str(payload_json).map_err(|e| {
			KitError::Serialization(format!("Invalid payload for {}: {}", action_name, e))
		})?;
		Ok(ChainAction {
			contract: contract.to_string(),
			name: action_name.to_string(),
			authorization: vec![Authorization::active(account)],
			data,
		})
	}

	async fn submit(&self, action: ChainAction) -> Result<PushedTransaction, KitError> {
		let name = action.name.clone();
		match self.chain.sign_and_broadcast(vec![action]).await {
			Ok(pushed) => {
				info!("{} accepted as {}", name, pushed.transaction_id);
				Ok(pushed)
			}
			Err(e) => {
				error!("Failed to broadcast {}: {}", name, e);
				Err(translate_chain_error(e))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::chain::ChainError;
	use crate::kit::BackendError;
	use crate::test_support::MockChainClient;
	use std::sync::atomic::Ordering;

	fn setup() -> (Arc<MockChainClient>, TransactionManager) {
		let chain = Arc::new(MockChainClient::new());
		chain.set_balance("eosio.token", "EOS", "12.3456");
		let manager = TransactionManager::new(chain.clone(), "eosio");
		(chain, manager)
	}

	#[tokio::test]
	async fn test_transfer_payload() {
		let (chain, manager) = setup();
		let token = TokenId::new("eosio.token", "EOS");

		let id = manager
			.send("bob", &token, "alice", "1.0000".parse().expect("valid"), "hi")
			.await
			.expect("accepted");
		assert!(!id.is_empty());

		let broadcasts = chain.broadcasts();
		assert_eq!(broadcasts.len(), 1);
		let action = &broadcasts[0][0];
		assert_eq!(action.contract, "eosio.token");
		assert_eq!(action.name, "transfer");
		assert_eq!(action.authorization, vec![Authorization::active("bob")]);
		assert_eq!(
			action.data,
			json!({"from": "bob", "to": "alice", "quantity": "1.0000 EOS", "memo": "hi"})
		);
	}

	#[tokio::test]
	async fn test_overdrawn_is_typed_and_not_retried() {
		let (chain, manager) = setup();
		let token = TokenId::new("eosio.token", "EOS");

		let result = manager
			.send("bob", &token, "alice", "1000000.0000".parse().expect("valid"), "")
			.await;
		assert!(matches!(
			result,
			Err(KitError::Backend(BackendError::BalanceOverdrawn(_)))
		));
		assert_eq!(chain.broadcast_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_network_failure_is_not_retried() {
		let (chain, manager) = setup();
		chain.fail_broadcast_with(Some(ChainError::Network("connection reset".to_string())));
		let token = TokenId::new("eosio.token", "EOS");

		let result = manager
			.send("bob", &token, "alice", "1.0000".parse().expect("valid"), "")
			.await;
		assert_eq!(result, Err(KitError::Network("connection reset".to_string())));
		assert_eq!(chain.broadcast_calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_account_creation_payload() {
		let (chain, manager) = setup();
		let key = "EOS6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5GDW5CV";

		manager
			.send_account_creation("bob", "newaccount12", key)
			.await
			.expect("accepted");

		let action = &chain.broadcasts()[0][0];
		assert_eq!(action.contract, "eosio");
		assert_eq!(action.name, "newaccount");
		assert_eq!(action.data["name"], "newaccount12");
		for permission in ["owner", "active"] {
			assert_eq!(action.data[permission]["threshold"], 1);
			assert_eq!(action.data[permission]["keys"][0]["key"], key);
			assert_eq!(action.data[permission]["keys"][0]["weight"], 1);
		}
	}

	#[tokio::test]
	async fn test_send_action_returns_processed() {
		let (chain, manager) = setup();

		let processed = manager
			.send_action("bob", "voteproducer", "eosio", r#"{"voter": "bob", "proxy": "", "producers": []}"#)
			.await
			.expect("accepted");
		assert_eq!(processed["receipt"]["status"], "executed");
		assert_eq!(chain.broadcasts()[0][0].data["voter"], "bob");

		let invalid = manager.send_json("bob", "voteproducer", "eosio", "{oops").await;
		assert!(matches!(invalid, Err(KitError::Serialization(_))));
		// Invalid payloads never reach the chain.
		assert_eq!(chain.broadcast_calls.load(Ordering::SeqCst), 1);
	}
}
