//! Mapping of nodeos rejections to `BackendError`s.
//!
//! A rejected `push_transaction` comes back as an HTTP error whose body is the nodeos error
//! envelope. The well-known contract assertions and resource exceptions are recognised by the
//! exception name and the detail messages; any other envelope becomes `BackendError::Unknown`.
//! Bodies that are not an envelope leave the original error untouched.

use crate::chain::{ChainError, RpcErrorResponse};
use crate::kit::{BackendError, BackendErrorDetail, KitError};

const RESOURCE_EXCEPTIONS: &[&str] = &[
	"tx_cpu_usage_exceeded",
	"tx_net_usage_exceeded",
	"ram_usage_exceeded",
	"leeway_deadline_exception",
	"deadline_exception",
];

/// Build the typed error for a parsed envelope.
pub fn backend_error_from_response(response: &RpcErrorResponse) -> BackendError {
	let detail = BackendErrorDetail {
		message: response.message.clone(),
		code: response.error.code,
		detail: response.detail(),
	};

	let name = response.error.name.as_str();
	let text = detail.detail.to_lowercase();

	if text.contains("overdrawn balance") {
		BackendError::BalanceOverdrawn(detail)
	} else if text.contains("symbol precision mismatch") {
		BackendError::SymbolPrecisionMismatch(detail)
	} else if text.contains("account does not exist") || name == "unknown_key" {
		BackendError::AccountNotExist(detail)
	} else if RESOURCE_EXCEPTIONS.contains(&name) {
		BackendError::InsufficientResource(detail)
	} else {
		BackendError::Unknown(detail)
	}
}

/// Translate a broadcast failure. Untranslatable errors propagate unchanged.
pub fn translate_chain_error(error: ChainError) -> KitError {
	if let ChainError::Rpc { body, .. } = &error {
		if let Some(response) = RpcErrorResponse::parse(body) {
			return KitError::Backend(backend_error_from_response(&response));
		}
	}
	KitError::from(error)
}
