//! Types for EOSIO RPC integration

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kit::Action;

/// A `(actor, permission)` pair authorizing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub actor: String,
    pub permission: String,
}

impl Authorization {
    /// The `account@active` authorization used for every submission from the kit.
    pub fn active(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            permission: "active".to_string(),
        }
    }
}

/// An action request handed to the chain client for signing and broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAction {
    /// Contract account that owns the action.
    #[serde(rename = "account")]
    pub contract: String,
    pub name: String,
    pub authorization: Vec<Authorization>,
    pub data: serde_json::Value,
}

/// Result of a successful `push_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedTransaction {
    pub transaction_id: String,
    /// The chain's raw "processed" trace.
    #[serde(default)]
    pub processed: serde_json::Value,
}

/// One page of account history.
#[derive(Debug, Clone)]
pub struct ActionsPage {
    /// Actions in ascending sequence order.
    pub actions: Vec<Action>,
    /// Cursor for the following page, `None` once the chain reports no more actions.
    pub next_cursor: Option<u64>,
    pub last_irreversible_block: u64,
}

/// `get_currency_balance` returns a list of asset strings.
pub type CurrencyBalanceResponse = Vec<String>;

/// Raw `history/get_actions` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GetActionsResponse {
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    pub last_irreversible_block: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionEntry {
    pub account_action_seq: u64,
    #[serde(default)]
    pub block_num: u64,
    #[serde(default)]
    pub block_time: Option<String>,
    pub action_trace: ActionTrace,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionTrace {
    #[serde(default)]
    pub trx_id: String,
    pub act: ActionBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionBody {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ActionEntry {
    /// Convert a history entry into the kit's action record for `account`.
    pub fn into_action(self, account: &str) -> Action {
        Action {
            account: account.to_string(),
            sequence: self.account_action_seq,
            block_number: self.block_num,
            block_time: self.block_time.as_deref().and_then(parse_block_time),
            transaction_id: self.action_trace.trx_id,
            contract: self.action_trace.act.account,
            name: self.action_trace.act.name,
            data: self.action_trace.act.data,
        }
    }
}

/// Block times come without a zone suffix and are always UTC.
fn parse_block_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Error envelope returned by nodeos for rejected requests.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorResponse {
    pub code: u16,
    pub message: String,
    pub error: RpcErrorInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorInfo {
    pub code: u64,
    pub name: String,
    #[serde(default)]
    pub what: String,
    #[serde(default)]
    pub details: Vec<RpcErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorDetail {
    pub message: String,
    #[serde(default)]
    pub method: Option<String>,
}

impl RpcErrorResponse {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// Detail messages joined in order, falling back to `what`.
    pub fn detail(&self) -> String {
        if self.error.details.is_empty() {
            return self.error.what.clone();
        }
        self.error
            .details
            .iter()
            .map(|d| d.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Errors raised by the chain client collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("RPC error (status {status}): {body}")]
    Rpc { status: u16, body: String },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Transport failures are the only ones worth retrying on the sync path.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Network(_))
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChainError::InvalidResponse(e.to_string())
        } else {
            ChainError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Serialization(e.to_string())
    }
}
