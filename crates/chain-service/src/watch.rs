//! Following a chain's head feed.

use anyhow::{Context as _, Result};
use chain_types::{ChainId, ChainReader, Context, Header};
use std::{future::Future, num::NonZeroUsize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Buffered heads between the feed and the printer.
const HEAD_BUFFER: usize = 16;

/// Logs new heads of `reader` until `limit` heads were seen, `shutdown`
/// resolves or the feed fails.
///
/// Returns the number of heads seen. A feed fault is returned as an error,
/// even if it races with the end of the data channel.
pub async fn follow_heads<R, S>(
	reader: &R,
	ctx: &Context,
	chain_id: ChainId,
	limit: Option<NonZeroUsize>,
	shutdown: S,
) -> Result<usize>
where
	R: ChainReader + ?Sized,
	S: Future<Output = ()>,
{
	let (tx, mut rx) = mpsc::channel(HEAD_BUFFER);
	let subscription = reader
		.subscribe_new_head(ctx, tx)
		.await
		.with_context(|| format!("Failed to subscribe to heads on chain {}", chain_id))?;

	info!("Watching new heads on chain {}", chain_id);
	tokio::pin!(shutdown);

	let mut seen = 0usize;
	loop {
		tokio::select! {
			biased;
			outcome = subscription.err() => {
				if let Some(e) = outcome {
					return Err(e).with_context(|| format!("Head feed for chain {} failed", chain_id));
				}
				break;
			}
			_ = &mut shutdown => {
				info!("Shutdown signal received, stopping watch...");
				break;
			}
			head = rx.recv() => match head {
				Some(header) => {
					log_header(chain_id, &header);
					seen += 1;
					if limit.is_some_and(|limit| seen >= limit.get()) {
						break;
					}
				}
				// The feed closed the channel: its outcome decides
				None => {
					if let Some(e) = subscription.err().await {
						return Err(e).with_context(|| format!("Head feed for chain {} failed", chain_id));
					}
					break;
				}
			},
		}
	}

	subscription.unsubscribe();
	info!("Stopped watching chain {} after {} heads", chain_id, seen);
	Ok(seen)
}

pub fn log_header(chain_id: ChainId, header: &Header) {
	match header.hash {
		Some(hash) => info!(
			"Chain {} block {} ({:?}), timestamp {}",
			chain_id, header.number, hash, header.timestamp
		),
		None => warn!("Chain {} block {} is pending, no hash yet", chain_id, header.number),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_client::MemoryChain;
	use chain_types::{Bytes32, ChainError};
	use std::{sync::Arc, time::Duration};
	use tokio::task::JoinHandle;

	const TEST_TIMEOUT: Duration = Duration::from_secs(5);

	fn spawn_follow(
		chain: &Arc<MemoryChain>,
		limit: Option<usize>,
	) -> JoinHandle<Result<usize>> {
		let reader = chain.clone();
		tokio::spawn(async move {
			follow_heads(
				reader.as_ref(),
				&Context::background(),
				ChainId::ETHEREUM,
				limit.and_then(NonZeroUsize::new),
				std::future::pending(),
			)
			.await
		})
	}

	async fn wait_for_subscriber(chain: &MemoryChain) {
		tokio::time::timeout(TEST_TIMEOUT, async {
			while chain.subscriber_count() == 0 {
				tokio::time::sleep(Duration::from_millis(1)).await;
			}
		})
		.await
		.expect("watch never subscribed");
	}

	#[tokio::test]
	async fn test_feed_fault_is_always_reported() {
		for _ in 0..100 {
			let chain = Arc::new(MemoryChain::new());
			let watch = spawn_follow(&chain, None);
			wait_for_subscriber(&chain).await;

			chain
				.push_header(Header::new(1u64).with_hash(Bytes32::repeat_byte(1)))
				.await;
			chain.inject_feed_fault(ChainError::Transport("connection reset".to_string()));

			let err = tokio::time::timeout(TEST_TIMEOUT, watch)
				.await
				.unwrap()
				.unwrap()
				.unwrap_err();
			assert_eq!(
				err.downcast_ref::<ChainError>(),
				Some(&ChainError::Transport("connection reset".to_string()))
			);
		}
	}

	#[tokio::test]
	async fn test_stops_after_limit() {
		let chain = Arc::new(MemoryChain::new());
		let watch = spawn_follow(&chain, Some(2));
		wait_for_subscriber(&chain).await;

		for n in 1..=3u64 {
			chain.push_header(Header::new(n)).await;
		}

		let seen = tokio::time::timeout(TEST_TIMEOUT, watch)
			.await
			.unwrap()
			.unwrap()
			.unwrap();
		assert_eq!(seen, 2);
	}

	#[tokio::test]
	async fn test_shutdown_stops_cleanly() {
		let chain = MemoryChain::new();
		let seen = follow_heads(
			&chain,
			&Context::background(),
			ChainId::ETHEREUM,
			None,
			async {},
		)
		.await
		.unwrap();
		assert_eq!(seen, 0);
	}

	#[tokio::test]
	async fn test_subscribe_failure_is_reported() {
		let chain = MemoryChain::new();
		let (ctx, cancel) = Context::background().with_cancel();
		cancel.cancel();

		let err = follow_heads(&chain, &ctx, ChainId::ETHEREUM, None, std::future::pending())
			.await
			.unwrap_err();
		assert_eq!(err.downcast_ref::<ChainError>(), Some(&ChainError::Cancelled));
	}
}
