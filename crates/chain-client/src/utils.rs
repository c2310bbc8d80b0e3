//! Retrying JSON-RPC transport.

use backoff::{backoff::Backoff, ExponentialBackoff};
use ethers::providers::{Http, JsonRpcClient, ProviderError, RpcError};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::warn;

/// Longest time spent retrying a single request.
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(30);

/// JSON-RPC client wrapper that retries failed requests with exponential
/// backoff.
///
/// Only transport failures are retried. A JSON-RPC error response means the
/// node answered, so repeating the request would get the same answer.
#[derive(Debug, Clone)]
pub struct RetryClient<T> {
	inner: T,
	backoff: ExponentialBackoff,
	max_retries: u32,
}

impl<T> RetryClient<T> {
	pub fn new(inner: T) -> Self {
		let backoff = ExponentialBackoff {
			max_elapsed_time: Some(MAX_RETRY_ELAPSED),
			..Default::default()
		};

		Self {
			inner,
			backoff,
			max_retries: 3,
		}
	}

	/// Sets the maximum number of retry attempts.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	pub fn max_retries(&self) -> u32 {
		self.max_retries
	}
}

#[async_trait::async_trait]
impl JsonRpcClient for RetryClient<Http> {
	type Error = ProviderError;

	async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
	where
		T: Serialize + Send + Sync + std::fmt::Debug,
		R: DeserializeOwned + Send,
	{
		let mut backoff = self.backoff.clone();
		let mut attempts = 0;

		loop {
			match self.inner.request(method, &params).await {
				Ok(result) => return Ok(result),
				Err(e) => {
					if e.as_error_response().is_some() {
						return Err(e.into());
					}

					attempts += 1;
					if attempts > self.max_retries {
						warn!(
							"RPC request {} failed after {} attempts, giving up: {}",
							method, attempts, e
						);
						return Err(e.into());
					}

					match backoff.next_backoff() {
						Some(delay) => {
							warn!(
								"RPC request {} failed, attempt {}/{}, retrying in {:?}: {}",
								method, attempts, self.max_retries, delay, e
							);
							tokio::time::sleep(delay).await;
						}
						None => {
							warn!(
								"RPC request {} failed, backoff exhausted after {} attempts: {}",
								method, attempts, e
							);
							return Err(e.into());
						}
					}
				}
			}
		}
	}
}
