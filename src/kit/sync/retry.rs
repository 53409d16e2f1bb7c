use crate::chain::ChainError;
use crate::config::RetryPolicy;

use std::future::Future;
use tracing::debug;

/// Run a chain read under `policy`. Only transient (network) failures are retried.
pub(crate) async fn with_retry<T, F, Fut>(
	policy: &RetryPolicy,
	what: &str,
	mut op: F,
) -> Result<T, ChainError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, ChainError>>,
{
	if !policy.enabled {
		return op().await;
	}

	backoff::future::retry(policy.backoff(), || {
		let attempt = op();
		async move {
			attempt.await.map_err(|e| {
				if e.is_transient() {
					debug!("{} failed, retrying: {}", what, e);
					backoff::Error::transient(e)
				} else {
					backoff::Error::permanent(e)
				}
			})
		}
	})
	.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	fn fast_policy() -> RetryPolicy {
		RetryPolicy {
			enabled: true,
			initial_interval: Duration::from_millis(1),
			max_interval: Duration::from_millis(2),
			max_elapsed_time: Duration::from_secs(1),
		}
	}

	#[tokio::test]
	async fn test_retries_network_errors() {
		let calls = AtomicUsize::new(0);
		let result = with_retry(&fast_policy(), "fetch", || {
			let n = calls.fetch_add(1, Ordering::SeqCst);
			async move {
				if n < 2 {
					Err(ChainError::Network("connection reset".to_string()))
				} else {
					Ok(n)
				}
			}
		})
		.await;
		assert_eq!(result, Ok(2));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn test_does_not_retry_permanent_errors() {
		let calls = AtomicUsize::new(0);
		let result: Result<(), _> = with_retry(&fast_policy(), "fetch", || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(ChainError::InvalidResponse("bad".to_string())) }
		})
		.await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_disabled_policy_calls_once() {
		let calls = AtomicUsize::new(0);
		let result: Result<(), _> = with_retry(&RetryPolicy::default(), "fetch", || {
			calls.fetch_add(1, Ordering::SeqCst);
			async { Err(ChainError::Network("down".to_string())) }
		})
		.await;
		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
