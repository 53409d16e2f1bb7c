use eos_wallet_sync::{
	FileStorage, HttpChainClient, KitConfig, KitNotification, SyncOrchestrator, SyncState,
};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DATA_DIR: &str = "data";
const SYNC_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	// Usage: eos-wallet-sync <account> [config.json]
	let mut args = std::env::args().skip(1);
	let Some(account) = args.next() else {
		error!("Usage: eos-wallet-sync <account> [config.json]");
		return;
	};

	let config = match args.next() {
		Some(path) => match KitConfig::from_file(&path).await {
			Ok(config) => config,
			Err(e) => {
				error!("Failed to load config from {}: {}", path, e);
				return;
			}
		},
		None => KitConfig::default(),
	};

	info!("Starting wallet sync for {} on {}", account, config.network);

	let storage = match FileStorage::open(DATA_DIR, config.network, &account).await {
		Ok(storage) => storage,
		Err(e) => {
			error!("Failed to open storage: {}", e);
			return;
		}
	};

	let chain = match HttpChainClient::new(config.rpc_host.clone()) {
		Ok(chain) => chain,
		Err(e) => {
			error!("Failed to create chain client: {}", e);
			return;
		}
	};

	let kit = SyncOrchestrator::new(&account, Arc::new(storage), Arc::new(chain), config).await;

	if let Err(e) = kit.validate(&account).await {
		error!("Cannot sync {}: {}", account, e);
		return;
	}

	let mut notifications = kit.subscribe();
	let token = kit.register("eosio.token", "EOS").await;
	kit.start();

	let waited = tokio::time::timeout(SYNC_TIMEOUT, async {
		while token.sync_state() == SyncState::Syncing {
			match notifications.recv().await {
				Ok(KitNotification::BalanceChanged { token, balance }) => {
					info!("Balance of {}: {}", token, balance)
				}
				Ok(KitNotification::TransactionsChanged { token, transactions }) => {
					info!("{} new transactions for {}", transactions.len(), token)
				}
				Ok(KitNotification::IrreversibleBlockChanged { height }) => {
					info!("Irreversible block: {}", height)
				}
				Ok(KitNotification::SyncStateChanged { .. }) => {}
				Err(broadcast::error::RecvError::Closed) => break,
				Err(e) => warn!("Notification stream: {}", e),
			}
		}
	})
	.await;

	if waited.is_err() {
		warn!("Sync did not settle within {:?}", SYNC_TIMEOUT);
	}

	info!("{} balance: {} ({})", token.id(), token.balance(), token.sync_state());
	match kit.transactions(&token, None, Some(10)).await {
		Ok(transactions) => {
			for tx in transactions {
				info!(
					"#{} {} {} -> {} {}",
					tx.sequence,
					tx.action_name,
					tx.from.unwrap_or_default(),
					tx.to.unwrap_or_default(),
					tx.quantity.map(|q| q.to_string()).unwrap_or_default()
				);
			}
		}
		Err(e) => error!("Failed to read transactions: {}", e),
	}

	for (label, value) in kit.status_info().entries() {
		info!("{}: {}", label, value);
	}

	kit.stop();
}
