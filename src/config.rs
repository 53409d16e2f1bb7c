//! Kit configuration.
//!
//! `KitConfig` carries everything the orchestrator and its managers need besides the injected
//! storage and chain client. Durations are written in milliseconds when loaded from JSON.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::kit::KitError;

/// Target network. Only used for diagnostics and storage naming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
pub enum NetworkType {
	#[default]
	MainNet,
	TestNet,
}

impl NetworkType {
	pub fn chain_id(&self) -> &'static str {
		match self {
			NetworkType::MainNet => {
				"aca376f206b8fc25a6ed44dbdc66547c36c6c33e3a119ffbeaef943642f0e906"
			}
			NetworkType::TestNet => {
				"e70aaab8997e1dfce58fbfac80cbbb8fecec7b99cf982a9444273cbc64c41473"
			}
		}
	}
}

impl fmt::Display for NetworkType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NetworkType::MainNet => write!(f, "MainNet"),
			NetworkType::TestNet => write!(f, "TestNet"),
		}
	}
}

/// Retry policy for sync-side chain reads.
///
/// Transaction submission never consults this policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	pub enabled: bool,
	#[serde(deserialize_with = "millis")]
	pub initial_interval: Duration,
	#[serde(deserialize_with = "millis")]
	pub max_interval: Duration,
	#[serde(deserialize_with = "millis")]
	pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			enabled: false,
			initial_interval: Duration::from_millis(500),
			max_interval: Duration::from_secs(5),
			max_elapsed_time: Duration::from_secs(30),
		}
	}
}

impl RetryPolicy {
	pub fn backoff(&self) -> backoff::ExponentialBackoff {
		backoff::ExponentialBackoff {
			initial_interval: self.initial_interval,
			current_interval: self.initial_interval,
			max_interval: self.max_interval,
			max_elapsed_time: Some(self.max_elapsed_time),
			..Default::default()
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KitConfig {
	pub network: NetworkType,
	pub rpc_host: String,
	/// Delay before re-syncing a balance after a successful submission.
	#[serde(deserialize_with = "millis")]
	pub balance_resync_delay: Duration,
	pub action_page_size: u32,
	pub max_action_pages_per_sync: u32,
	/// Periodic refresh interval used by `start()`. `None` disables the loop.
	#[serde(deserialize_with = "optional_millis")]
	pub sync_interval: Option<Duration>,
	/// Contract that owns `newaccount`.
	pub system_contract: String,
	pub notification_capacity: usize,
	pub retry: RetryPolicy,
}

impl Default for KitConfig {
	fn default() -> Self {
		Self {
			network: NetworkType::MainNet,
			rpc_host: "https://eos.greymass.com".to_string(),
			balance_resync_delay: Duration::from_secs(2),
			action_page_size: 50,
			max_action_pages_per_sync: 20,
			sync_interval: None,
			system_contract: "eosio".to_string(),
			notification_capacity: 64,
			retry: RetryPolicy::default(),
		}
	}
}

impl KitConfig {
	/// Load a configuration from a JSON file. Missing fields fall back to defaults.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, KitError> {
		let content = tokio::fs::read_to_string(path.as_ref())
			.await
			.map_err(|e| KitError::Storage(format!("Failed to read config file: {}", e)))?;
		Self::from_json(&content)
	}

	pub fn from_json(content: &str) -> Result<Self, KitError> {
		serde_json::from_str(content)
			.map_err(|e| KitError::Serialization(format!("Failed to parse config: {}", e)))
	}
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
	Ok(Duration::from_millis(u64::deserialize(deserializer)?))
}

fn optional_millis<'de, D: Deserializer<'de>>(
	deserializer: D,
) -> Result<Option<Duration>, D::Error> {
	Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}
