use crate::chain::ChainError;

/// Fields copied from the chain's rejection response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendErrorDetail {
	pub message: String,
	pub code: u64,
	pub detail: String,
}

/// Typed rejections recognised in broadcast failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
	#[error("Balance overdrawn: {} (code {})", .0.detail, .0.code)]
	BalanceOverdrawn(BackendErrorDetail),

	#[error("Account does not exist: {} (code {})", .0.detail, .0.code)]
	AccountNotExist(BackendErrorDetail),

	#[error("Symbol precision mismatch: {} (code {})", .0.detail, .0.code)]
	SymbolPrecisionMismatch(BackendErrorDetail),

	#[error("Insufficient resources: {} (code {})", .0.detail, .0.code)]
	InsufficientResource(BackendErrorDetail),

	#[error("Backend error: {} (code {})", .0.message, .0.code)]
	Unknown(BackendErrorDetail),
}

impl BackendError {
	pub fn detail(&self) -> &BackendErrorDetail {
		match self {
			BackendError::BalanceOverdrawn(d)
			| BackendError::AccountNotExist(d)
			| BackendError::SymbolPrecisionMismatch(d)
			| BackendError::InsufficientResource(d)
			| BackendError::Unknown(d) => d,
		}
	}
}

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KitError {
	#[error("Invalid key: {0}")]
	InvalidKey(String),

	#[error(transparent)]
	Backend(#[from] BackendError),

	#[error("Network error: {0}")]
	Network(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("Account not found: {0}")]
	AccountNotFound(String),

	#[error("Chain client error: {0}")]
	Chain(ChainError),

	#[error("Storage error: {0}")]
	Storage(String),

	#[error("Kit is stopped")]
	Stopped,
}

impl From<ChainError> for KitError {
	fn from(e: ChainError) -> Self {
		match e {
			ChainError::Network(msg) => KitError::Network(msg),
			ChainError::Serialization(msg) => KitError::Serialization(msg),
			other => KitError::Chain(other),
		}
	}
}
