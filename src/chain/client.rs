//!
//! HTTP client for EOSIO nodes.
//!
//! This module provides the `ChainClient` trait consumed by the sync managers and the
//! transaction manager, plus `HttpChainClient`, an async implementation over the nodeos RPC API.
//! All methods are async and designed for use with Tokio.

use super::types::*;
use crate::utils::{Amount, Asset};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Stateless request/response access to the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Current balance of `symbol` issued by `contract` held by `account`.
	async fn get_balance(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Amount, ChainError>;

	/// Up to `page_size` actions of `account` starting at sequence number `cursor`.
	async fn get_actions(
		&self,
		account: &str,
		cursor: u64,
		page_size: u32,
	) -> Result<ActionsPage, ChainError>;

	/// Whether `account` exists on chain.
	async fn validate_account(&self, account: &str) -> Result<bool, ChainError>;

	/// Sign `actions` into one transaction and broadcast it.
	async fn sign_and_broadcast(
		&self,
		actions: Vec<ChainAction>,
	) -> Result<PushedTransaction, ChainError>;
}

/// Produces the `push_transaction` body for a list of actions.
///
/// Serialization, ABI packing and signatures live behind this trait.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
	async fn sign(&self, actions: &[ChainAction]) -> Result<serde_json::Value, ChainError>;
}

/// EOSIO nodeos RPC client
#[derive(Clone)]
pub struct HttpChainClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the node, e.g. `https://eos.greymass.com`.
	rpc_host: String,
	signer: Option<Arc<dyn TransactionSigner>>,
}

impl HttpChainClient {
	/// Create a new client for `rpc_host` without a signer.
	///
	/// A client without a signer can sync but every submission fails with `ChainError::Signing`.
	pub fn new(rpc_host: impl Into<String>) -> Result<Self, ChainError> {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()
			.map_err(|e| ChainError::Network(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			http_client,
			rpc_host: rpc_host.into().trim_end_matches('/').to_string(),
			signer: None,
		})
	}

	pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
		self.signer = Some(signer);
		self
	}

	pub fn rpc_host(&self) -> &str {
		&self.rpc_host
	}

	/// POST a JSON body to `path` and decode the response.
	///
	/// Non-success statuses are returned as `ChainError::Rpc` with the raw body so callers can
	/// inspect the nodeos error envelope.
	async fn post<T: DeserializeOwned>(
		&self,
		path: &str,
		body: serde_json::Value,
	) -> Result<T, ChainError> {
		let url = format!("{}{}", self.rpc_host, path);
		debug!("POST {}", url);

		let response = self
			.http_client
			.post(&url)
			.header("Content-Type", "application/json")
			.json(&body)
			.send()
			.await?;

		let status = response.status();
		let text = response.text().await?;

		if !status.is_success() {
			debug!("{} returned {}: {}", path, status, text);
			return Err(ChainError::Rpc {
				status: status.as_u16(),
				body: text,
			});
		}

		serde_json::from_str(&text).map_err(|e| {
			ChainError::InvalidResponse(format!("Failed to decode {} response: {}", path, e))
		})
	}
}

#[async_trait]
impl ChainClient for HttpChainClient {
	async fn get_balance(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Amount, ChainError> {
		let balances: CurrencyBalanceResponse = self
			.post(
				"/v1/chain/get_currency_balance",
				json!({ "code": contract, "account": account, "symbol": symbol }),
			)
			.await?;

		// An account that never held the token gets an empty list.
		match balances.first() {
			Some(raw) => {
				let asset: Asset = raw.parse().map_err(|e| {
					ChainError::InvalidResponse(format!("Invalid balance '{}': {}", raw, e))
				})?;
				Ok(asset.amount)
			}
			None => Ok(Amount::zero()),
		}
	}

	async fn get_actions(
		&self,
		account: &str,
		cursor: u64,
		page_size: u32,
	) -> Result<ActionsPage, ChainError> {
		let page_size = page_size.max(1);
		let response: GetActionsResponse = self
			.post(
				"/v1/history/get_actions",
				json!({
					"account_name": account,
					"pos": cursor,
					"offset": page_size - 1,
				}),
			)
			.await?;

		let mut actions: Vec<_> = response
			.actions
			.into_iter()
			.map(|entry| entry.into_action(account))
			.collect();
		actions.sort_by_key(|a| a.sequence);
		// Inline actions show up once per receiver; keep the first.
		actions.dedup_by_key(|a| a.sequence);

		let next_cursor = if actions.len() >= page_size as usize {
			actions.last().map(|a| a.sequence + 1)
		} else {
			None
		};

		Ok(ActionsPage {
			actions,
			next_cursor,
			last_irreversible_block: response.last_irreversible_block,
		})
	}

	async fn validate_account(&self, account: &str) -> Result<bool, ChainError> {
		let result: Result<serde_json::Value, ChainError> = self
			.post("/v1/chain/get_account", json!({ "account_name": account }))
			.await;

		match result {
			Ok(_) => Ok(true),
			Err(ChainError::Rpc { status, body }) => match RpcErrorResponse::parse(&body) {
				Some(envelope)
					if matches!(
						envelope.error.name.as_str(),
						"unknown_key" | "account_query_exception"
					) =>
				{
					Ok(false)
				}
				_ => Err(ChainError::Rpc { status, body }),
			},
			Err(e) => Err(e),
		}
	}

	async fn sign_and_broadcast(
		&self,
		actions: Vec<ChainAction>,
	) -> Result<PushedTransaction, ChainError> {
		let signer = self
			.signer
			.as_ref()
			.ok_or_else(|| ChainError::Signing("No signer configured".to_string()))?;

		let signed = signer.sign(&actions).await?;
		let pushed: PushedTransaction = self.post("/v1/chain/push_transaction", signed).await?;

		info!("Broadcast transaction {}", pushed.transaction_id);
		Ok(pushed)
	}
}
