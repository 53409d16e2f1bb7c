use super::{ActionQuery, Storage, StorageSnapshot};
use crate::config::NetworkType;
use crate::kit::{Action, Balance, KitError};

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// On-disk layout of a snapshot file.
#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotFile {
	saved_at: String,
	snapshot: StorageSnapshot,
}

/// File-based storage holding one JSON snapshot per `(network, walletId)` pair.
///
/// Reads are served from memory. Every write rewrites the snapshot while holding the lock, so
/// file writes never interleave.
pub struct FileStorage {
	path: PathBuf,
	snapshot: Mutex<StorageSnapshot>,
}

impl FileStorage {
	pub fn database_name(network: NetworkType, wallet_id: &str) -> String {
		format!("Eos-{}-{}.json", network, wallet_id)
	}

	/// Open (or create) the snapshot for `(network, wallet_id)` inside `data_dir`.
	pub async fn open(
		data_dir: impl AsRef<Path>,
		network: NetworkType,
		wallet_id: &str,
	) -> Result<Self, KitError> {
		let data_dir = data_dir.as_ref();
		tokio::fs::create_dir_all(data_dir).await.map_err(|e| {
			KitError::Storage(format!("Failed to create data directory: {}", e))
		})?;

		let path = data_dir.join(Self::database_name(network, wallet_id));
		let snapshot = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
			let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
				KitError::Storage(format!("Failed to read storage file: {}", e))
			})?;
			let file: SnapshotFile = serde_json::from_str(&content).map_err(|e| {
				KitError::Storage(format!("Failed to parse storage file: {}", e))
			})?;
			info!("Loaded storage from {:?} (saved at {})", path, file.saved_at);
			file.snapshot
		} else {
			info!("No storage file at {:?}, starting empty", path);
			StorageSnapshot::default()
		};

		Ok(Self {
			path,
			snapshot: Mutex::new(snapshot),
		})
	}

	/// Delete the snapshot for `(network, wallet_id)`.
	pub async fn clear(
		data_dir: impl AsRef<Path>,
		network: NetworkType,
		wallet_id: &str,
	) -> Result<(), KitError> {
		let path = data_dir
			.as_ref()
			.join(Self::database_name(network, wallet_id));
		match tokio::fs::remove_file(&path).await {
			Ok(()) => {
				info!("Removed storage file {:?}", path);
				Ok(())
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(KitError::Storage(format!(
				"Failed to remove storage file: {}",
				e
			))),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	async fn write(&self, snapshot: &StorageSnapshot) -> Result<(), KitError> {
		let file = SnapshotFile {
			saved_at: chrono::Utc::now().to_rfc3339(),
			snapshot: snapshot.clone(),
		};
		let content = serde_json::to_string_pretty(&file).map_err(|e| {
			KitError::Storage(format!("Failed to serialize storage snapshot: {}", e))
		})?;

		// Write to a sibling file first so a crash never leaves a truncated snapshot.
		let tmp = self.path.with_extension("json.tmp");
		tokio::fs::write(&tmp, content).await.map_err(|e| {
			KitError::Storage(format!("Failed to write storage file: {}", e))
		})?;
		tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
			KitError::Storage(format!("Failed to replace storage file: {}", e))
		})?;

		debug!("Saved storage snapshot to {:?}", self.path);
		Ok(())
	}
}

#[async_trait::async_trait]
impl Storage for FileStorage {
	async fn get_balance(
		&self,
		account: &str,
		contract: &str,
		symbol: &str,
	) -> Result<Option<Balance>, KitError> {
		Ok(self.snapshot.lock().await.balance(account, contract, symbol))
	}

	async fn save_balance(&self, balance: &Balance) -> Result<(), KitError> {
		let mut snapshot = self.snapshot.lock().await;
		snapshot.upsert_balance(balance);
		self.write(&snapshot).await
	}

	async fn get_actions(&self, query: &ActionQuery) -> Result<Vec<Action>, KitError> {
		Ok(self.snapshot.lock().await.query_actions(query))
	}

	async fn last_action_sequence(&self, account: &str) -> Result<Option<u64>, KitError> {
		Ok(self.snapshot.lock().await.last_action_sequence(account))
	}

	async fn save_actions(&self, actions: &[Action]) -> Result<(), KitError> {
		if actions.is_empty() {
			return Ok(());
		}
		let mut snapshot = self.snapshot.lock().await;
		snapshot.upsert_actions(actions);
		self.write(&snapshot).await
	}

	async fn get_irreversible_block_height(&self) -> Result<Option<u64>, KitError> {
		Ok(self.snapshot.lock().await.irreversible_block_height)
	}

	async fn save_irreversible_block_height(&self, height: u64) -> Result<(), KitError> {
		let mut snapshot = self.snapshot.lock().await;
		if snapshot.irreversible_block_height == Some(height) {
			return Ok(());
		}
		snapshot.irreversible_block_height = Some(height);
		self.write(&snapshot).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn temp_dir(name: &str) -> PathBuf {
		std::env::temp_dir().join(format!(
			"eos-wallet-sync-{}-{}",
			name,
			std::process::id()
		))
	}

	#[tokio::test]
	async fn test_snapshot_survives_reopen() {
		let dir = temp_dir("reopen");
		FileStorage::clear(&dir, NetworkType::TestNet, "w1")
			.await
			.expect("clear");

		{
			let storage = FileStorage::open(&dir, NetworkType::TestNet, "w1")
				.await
				.expect("open");
			storage
				.save_balance(&Balance {
					account: "alice".to_string(),
					contract: "eosio.token".to_string(),
					symbol: "EOS".to_string(),
					value: "12.3456".parse().expect("valid amount"),
				})
				.await
				.expect("save");
			storage
				.save_irreversible_block_height(105)
				.await
				.expect("save");
		}

		let reopened = FileStorage::open(&dir, NetworkType::TestNet, "w1")
			.await
			.expect("open");
		assert_eq!(
			reopened.get_irreversible_block_height().await.expect("read"),
			Some(105)
		);
		let balance = reopened
			.get_balance("alice", "eosio.token", "EOS")
			.await
			.expect("read")
			.expect("present");
		assert_eq!(balance.value.to_string(), "12.3456");

		FileStorage::clear(&dir, NetworkType::TestNet, "w1")
			.await
			.expect("clear");
		assert!(!reopened.path().exists());
	}

	#[test]
	fn test_database_name() {
		assert_eq!(
			FileStorage::database_name(NetworkType::MainNet, "unique-id"),
			"Eos-MainNet-unique-id.json"
		);
	}
}
