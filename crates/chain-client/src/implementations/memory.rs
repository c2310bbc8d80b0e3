//! In-memory chain backend.
//!
//! Keeps a canonical chain, per-account nonces and a head feed entirely in
//! process. Suitable for development and for exercising application code
//! against the chain capabilities without a node.

use async_trait::async_trait;
use chain_types::{
	Address, Block, BlockNumber, ChainError, ChainReader, Context, ContractTransactor, Header,
	Result, Subscription, SubscriptionHandle,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{
	broadcast::{self, error::RecvError},
	mpsc, RwLock,
};
use tracing::{debug, info, warn};

/// Capacity of the head broadcast. Subscribers that fall further behind skip
/// the intermediate heads.
const HEAD_FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum HeadEvent {
	Head(Header),
	Fault(ChainError),
}

#[derive(Debug, Default)]
struct ChainState {
	blocks: BTreeMap<BlockNumber, Block>,
	/// Nonce of the next mined transaction per account.
	nonces: HashMap<Address, u64>,
	/// Transactions submitted but not yet mined per account.
	pending: HashMap<Address, u64>,
}

impl ChainState {
	fn head(&self) -> Result<&Block> {
		self.blocks
			.values()
			.next_back()
			.ok_or_else(|| ChainError::NotFound("chain has no head".to_string()))
	}

	fn block(&self, number: Option<BlockNumber>) -> Result<&Block> {
		match number {
			None => self.head(),
			Some(number) => self
				.blocks
				.get(&number)
				.ok_or_else(|| ChainError::NotFound(format!("block {}", number))),
		}
	}

	fn pending_nonce(&self, account: &Address) -> Result<u64> {
		let confirmed = self.nonces.get(account).copied().unwrap_or(0);
		confirmed
			.checked_add(self.pending.get(account).copied().unwrap_or(0))
			.ok_or_else(nonce_overflow)
	}
}

fn nonce_overflow() -> ChainError {
	ChainError::Transport("nonce overflow".to_string())
}

/// Chain backend held entirely in memory.
pub struct MemoryChain {
	state: RwLock<ChainState>,
	heads: broadcast::Sender<HeadEvent>,
}

impl MemoryChain {
	/// Creates a chain holding only a genesis block.
	pub fn new() -> Self {
		Self::with_head(0u64)
	}

	/// Creates a chain whose head is block `number`, with a genesis block
	/// below it. Intermediate blocks are not populated.
	pub fn with_head(number: impl Into<BlockNumber>) -> Self {
		let mut state = ChainState::default();
		let genesis = Block::new(Header::new(0u64));
		state.blocks.insert(genesis.number(), genesis);

		let head = Block::new(Header::new(number));
		state.blocks.insert(head.number(), head);

		let (heads, _) = broadcast::channel(HEAD_FEED_CAPACITY);
		Self {
			state: RwLock::new(state),
			heads,
		}
	}

	/// Current head header.
	pub async fn head(&self) -> Result<Header> {
		let state = self.state.read().await;
		state.head().map(|b| b.header().clone())
	}

	/// Makes `header` the new head.
	pub async fn push_header(&self, header: Header) {
		self.push_block(Block::new(header)).await
	}

	/// Makes `block` the new head.
	///
	/// Any canonical blocks at or above its number are dropped first, so a
	/// block lower than the current head models a reorganization.
	pub async fn push_block(&self, block: Block) {
		let header = block.header().clone();
		{
			let mut state = self.state.write().await;
			let replaced = state.blocks.split_off(&block.number());
			if !replaced.is_empty() {
				info!(
					"Reorganization: replacing {} block(s) from {}",
					replaced.len(),
					block.number()
				);
			}
			state.blocks.insert(block.number(), block);
		}

		debug!("New head {}", header.number);
		// No receivers just means nobody is subscribed
		let _ = self.heads.send(HeadEvent::Head(header));
	}

	/// Sets the confirmed nonce of `account`.
	pub async fn set_nonce(&self, account: Address, nonce: u64) {
		let mut state = self.state.write().await;
		state.nonces.insert(account, nonce);
	}

	/// Records a pending transaction from `account` and returns the nonce it
	/// occupies.
	///
	/// # Errors
	///
	/// Fails with `ChainError::Transport` once the account's nonce space is
	/// exhausted. Nothing is recorded in that case.
	pub async fn add_pending_transaction(&self, account: Address) -> Result<u64> {
		let mut state = self.state.write().await;
		let nonce = state.pending_nonce(&account)?;
		// The next caller must still get a representable nonce
		nonce.checked_add(1).ok_or_else(nonce_overflow)?;
		*state.pending.entry(account).or_insert(0) += 1;
		Ok(nonce)
	}

	/// Mines every pending transaction of `account`.
	///
	/// The confirmed nonce saturates at `u64::MAX`.
	pub async fn mine_pending(&self, account: Address) {
		let mut state = self.state.write().await;
		if let Some(mined) = state.pending.remove(&account) {
			let confirmed = state.nonces.entry(account).or_insert(0);
			*confirmed = confirmed.saturating_add(mined);
		}
	}

	/// Number of head subscriptions currently attached to the feed.
	pub fn subscriber_count(&self) -> usize {
		self.heads.receiver_count()
	}

	/// Fails every live head subscription with `error`.
	pub fn inject_feed_fault(&self, error: ChainError) {
		warn!("Injecting head feed fault: {}", error);
		let _ = self.heads.send(HeadEvent::Fault(error));
	}

	/// Delivers head events into `sink` until the subscription closes.
	async fn run_feed(
		mut events: broadcast::Receiver<HeadEvent>,
		sink: mpsc::Sender<Header>,
		feed: SubscriptionHandle,
	) {
		loop {
			let event = tokio::select! {
				biased;
				_ = feed.closed() => break,
				event = events.recv() => event,
			};

			match event {
				Ok(HeadEvent::Head(header)) => {
					if !feed.deliver(&sink, header).await {
						debug!("Head subscription closed");
						break;
					}
				}
				Ok(HeadEvent::Fault(error)) => {
					feed.fail(error);
					break;
				}
				Err(RecvError::Lagged(skipped)) => {
					debug!("Head subscriber lagged, skipped {} head(s)", skipped);
				}
				Err(RecvError::Closed) => {
					feed.fail(ChainError::Transport("head feed closed".to_string()));
					break;
				}
			}
		}
	}
}

impl Default for MemoryChain {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl ChainReader for MemoryChain {
	async fn header_by_number(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Header> {
		ctx.run(async {
			let state = self.state.read().await;
			state.block(number).map(|b| b.header().clone())
		})
		.await
	}

	async fn block_by_number(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Block> {
		ctx.run(async {
			let state = self.state.read().await;
			state.block(number).cloned()
		})
		.await
	}

	async fn subscribe_new_head(
		&self,
		ctx: &Context,
		sink: mpsc::Sender<Header>,
	) -> Result<Box<dyn Subscription>> {
		ctx.run(async {
			let events = self.heads.subscribe();
			let handle = SubscriptionHandle::new();

			tokio::spawn(Self::run_feed(events, sink, handle.clone()));

			Ok(Box::new(handle) as Box<dyn Subscription>)
		})
		.await
	}
}

#[async_trait]
impl ContractTransactor for MemoryChain {
	async fn pending_nonce_at(&self, ctx: &Context, account: Address) -> Result<u64> {
		ctx.run(async {
			let state = self.state.read().await;
			let nonce = state.pending_nonce(&account)?;
			debug!("Pending nonce for {} is {}", account.terminal_string(), nonce);
			Ok(nonce)
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chain_types::{Bytes32, Chain, SubscriptionState, U256};
	use std::{sync::Arc, time::Duration};

	const TEST_TIMEOUT: Duration = Duration::from_secs(5);

	fn header(number: u64, tag: u8) -> Header {
		Header::new(number).with_hash(Bytes32::repeat_byte(tag))
	}

	fn account(byte: u8) -> Address {
		Address::new([byte; 20])
	}

	async fn next_head(rx: &mut mpsc::Receiver<Header>) -> Option<Header> {
		tokio::time::timeout(TEST_TIMEOUT, rx.recv())
			.await
			.expect("timed out waiting for head")
	}

	#[tokio::test]
	async fn test_latest_header_is_seeded_head() {
		let chain = MemoryChain::with_head(1234u64);
		let head = chain
			.header_by_number(&Context::background(), None)
			.await
			.unwrap();
		assert_eq!(head.number, U256::from(1234));
	}

	#[tokio::test]
	async fn test_header_by_number() {
		let chain = MemoryChain::new();
		chain.push_header(header(1, 0x01)).await;
		let ctx = Context::background();

		let found = chain
			.header_by_number(&ctx, Some(U256::from(1)))
			.await
			.unwrap();
		assert_eq!(found.hash, Some(Bytes32::repeat_byte(0x01)));

		let missing = chain.header_by_number(&ctx, Some(U256::from(2))).await;
		assert!(matches!(missing, Err(ChainError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_block_by_number_keeps_transactions() {
		let chain = MemoryChain::new();
		let block = Block::new(header(1, 0x01)).with_transactions(vec![Bytes32::repeat_byte(9)]);
		chain.push_block(block.clone()).await;

		let latest = chain
			.block_by_number(&Context::background(), None)
			.await
			.unwrap();
		assert_eq!(latest, block);
	}

	#[tokio::test]
	async fn test_cancelled_context_returns_promptly() {
		let chain = MemoryChain::with_head(5u64);
		let (ctx, cancel) = Context::background().with_cancel();
		cancel.cancel();

		let result = tokio::time::timeout(
			Duration::from_millis(100),
			chain.header_by_number(&ctx, None),
		)
		.await
		.expect("call did not return promptly");
		assert_eq!(result, Err(ChainError::Cancelled));

		let nonce = chain.pending_nonce_at(&ctx, account(1)).await;
		assert_eq!(nonce, Err(ChainError::Cancelled));
	}

	#[tokio::test]
	async fn test_cancel_while_blocked_on_state() {
		let chain = Arc::new(MemoryChain::new());
		// Hold the write lock so the read blocks
		let guard = chain.state.write().await;

		let (ctx, cancel) = Context::background().with_cancel();
		let reader = chain.clone();
		let call = tokio::spawn(async move { reader.header_by_number(&ctx, None).await });

		tokio::time::sleep(Duration::from_millis(10)).await;
		cancel.cancel();

		let result = tokio::time::timeout(TEST_TIMEOUT, call)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(result, Err(ChainError::Cancelled));
		drop(guard);
	}

	#[tokio::test]
	async fn test_pending_nonce_is_stable_without_submissions() {
		let chain = MemoryChain::new();
		let ctx = Context::background();
		chain.set_nonce(account(1), 7).await;

		let first = chain.pending_nonce_at(&ctx, account(1)).await.unwrap();
		let second = chain.pending_nonce_at(&ctx, account(1)).await.unwrap();
		assert_eq!(first, 7);
		assert_eq!(first, second);

		// Unknown accounts start at zero
		assert_eq!(chain.pending_nonce_at(&ctx, account(2)).await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_pending_nonce_counts_pending_transactions() {
		let chain = MemoryChain::new();
		let ctx = Context::background();
		chain.set_nonce(account(1), 3).await;

		assert_eq!(chain.add_pending_transaction(account(1)).await.unwrap(), 3);
		assert_eq!(chain.add_pending_transaction(account(1)).await.unwrap(), 4);
		assert_eq!(chain.pending_nonce_at(&ctx, account(1)).await.unwrap(), 5);

		// Mining moves pending into confirmed without changing the next nonce
		chain.mine_pending(account(1)).await;
		assert_eq!(chain.pending_nonce_at(&ctx, account(1)).await.unwrap(), 5);
	}

	#[tokio::test]
	async fn test_nonce_overflow_is_an_error() {
		let chain = MemoryChain::new();
		let ctx = Context::background();

		chain.set_nonce(account(1), u64::MAX - 1).await;
		assert_eq!(
			chain.add_pending_transaction(account(1)).await.unwrap(),
			u64::MAX - 1
		);
		assert_eq!(
			chain.pending_nonce_at(&ctx, account(1)).await.unwrap(),
			u64::MAX
		);

		// No nonce is left to hand out
		assert!(matches!(
			chain.add_pending_transaction(account(1)).await,
			Err(ChainError::Transport(_))
		));

		// Raising the confirmed nonce under a pending transaction overflows the sum
		chain.set_nonce(account(1), u64::MAX).await;
		assert!(matches!(
			chain.pending_nonce_at(&ctx, account(1)).await,
			Err(ChainError::Transport(_))
		));
		assert!(matches!(
			chain.add_pending_transaction(account(1)).await,
			Err(ChainError::Transport(_))
		));

		// The state lock is still usable and mining saturates
		chain.mine_pending(account(1)).await;
		assert_eq!(
			chain.pending_nonce_at(&ctx, account(1)).await.unwrap(),
			u64::MAX
		);
	}

	#[tokio::test]
	async fn test_subscription_delivers_heads_in_order() {
		let chain = MemoryChain::new();
		let (tx, mut rx) = mpsc::channel(16);
		let sub = chain
			.subscribe_new_head(&Context::background(), tx)
			.await
			.unwrap();
		assert_eq!(chain.subscriber_count(), 1);

		for n in 1..=3u64 {
			chain.push_header(header(n, n as u8)).await;
		}

		for n in 1..=3u64 {
			let head = next_head(&mut rx).await.unwrap();
			assert_eq!(head.number, U256::from(n));
		}

		sub.unsubscribe();
		assert_eq!(sub.err().await, None);
	}

	#[tokio::test]
	async fn test_unsubscribe_stops_delivery() {
		let chain = MemoryChain::new();
		let (tx, mut rx) = mpsc::channel(16);
		let sub = chain
			.subscribe_new_head(&Context::background(), tx)
			.await
			.unwrap();

		sub.unsubscribe();
		sub.unsubscribe();
		chain.push_header(header(1, 1)).await;

		// The feed task drops the sender once it observes the close
		assert!(next_head(&mut rx).await.is_none());
		assert_eq!(sub.state(), SubscriptionState::Unsubscribed);
	}

	#[tokio::test]
	async fn test_feed_fault_is_delivered_once() {
		let chain = MemoryChain::new();
		let (tx, mut rx) = mpsc::channel(16);
		let sub = chain
			.subscribe_new_head(&Context::background(), tx)
			.await
			.unwrap();

		chain.inject_feed_fault(ChainError::Transport("connection reset".to_string()));
		chain.inject_feed_fault(ChainError::Transport("second".to_string()));

		let outcome = tokio::time::timeout(TEST_TIMEOUT, sub.err()).await.unwrap();
		assert_eq!(
			outcome,
			Some(ChainError::Transport("connection reset".to_string()))
		);
		assert!(next_head(&mut rx).await.is_none());

		// Unsubscribing a failed feed keeps the fault
		sub.unsubscribe();
		assert_eq!(
			sub.err().await,
			Some(ChainError::Transport("connection reset".to_string()))
		);
	}

	#[tokio::test]
	async fn test_dropped_receiver_closes_subscription() {
		let chain = MemoryChain::new();
		let (tx, rx) = mpsc::channel(16);
		let sub = chain
			.subscribe_new_head(&Context::background(), tx)
			.await
			.unwrap();

		drop(rx);
		chain.push_header(header(1, 1)).await;

		let outcome = tokio::time::timeout(TEST_TIMEOUT, sub.err()).await.unwrap();
		assert_eq!(outcome, None);
		assert_eq!(sub.state(), SubscriptionState::Unsubscribed);
	}

	#[tokio::test]
	async fn test_subscribe_with_cancelled_context_fails() {
		let chain = MemoryChain::new();
		let (ctx, cancel) = Context::background().with_cancel();
		cancel.cancel();

		let (tx, _rx) = mpsc::channel(1);
		let result = chain.subscribe_new_head(&ctx, tx).await;
		assert!(matches!(result, Err(ChainError::Cancelled)));
	}

	#[tokio::test]
	async fn test_context_cancel_after_subscribe_has_no_effect() {
		let chain = MemoryChain::new();
		let (ctx, cancel) = Context::background().with_cancel();
		let (tx, mut rx) = mpsc::channel(16);
		let sub = chain.subscribe_new_head(&ctx, tx).await.unwrap();

		cancel.cancel();
		chain.push_header(header(1, 1)).await;

		assert_eq!(next_head(&mut rx).await.unwrap().number, U256::from(1));
		assert!(sub.state().is_active());
	}

	#[tokio::test]
	async fn test_reorganization_replaces_tail() {
		let chain = MemoryChain::new();
		let ctx = Context::background();
		for n in 1..=3u64 {
			chain.push_header(header(n, 0xa0 + n as u8)).await;
		}

		chain.push_header(header(2, 0xb2)).await;

		let head = chain.head().await.unwrap();
		assert_eq!(head.number, U256::from(2));
		assert_eq!(head.hash, Some(Bytes32::repeat_byte(0xb2)));
		let gone = chain.header_by_number(&ctx, Some(U256::from(3))).await;
		assert!(matches!(gone, Err(ChainError::NotFound(_))));
	}

	#[tokio::test]
	async fn test_usable_as_chain_handle() {
		let chain: Arc<dyn Chain> = Arc::new(MemoryChain::with_head(10u64));
		let ctx = Context::background();

		let head = chain.header_by_number(&ctx, None).await.unwrap();
		assert_eq!(head.number, U256::from(10));
		assert_eq!(chain.pending_nonce_at(&ctx, account(1)).await.unwrap(), 0);
	}
}
