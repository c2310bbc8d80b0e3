//! Ethers-based EVM chain backend.
//!
//! Requests go over JSON-RPC through an ethers `Provider` wrapped in
//! [`RetryClient`]. Head changes come from an `eth_subscribe("newHeads")`
//! feed when a WebSocket endpoint is configured, and from polling the latest
//! block otherwise.
//!
//! The backend validates the chain ID on connection so that a misconfigured
//! endpoint fails at startup instead of serving another chain's data.

use async_trait::async_trait;
use chain_config::ChainConfig;
use chain_types::{
	Address, Block, BlockNumber, ChainError, ChainId, ChainReader, Context, ContractTransactor,
	Header, Result, Subscription, SubscriptionHandle, TxHash, U256,
};
use ethers::{
	providers::{Http, JsonRpcClient, Middleware, Provider, ProviderError, Ws},
	types::{Block as EthersBlock, BlockId, BlockNumber as EthersBlockNumber, H160},
};
use futures::{Stream, StreamExt};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::{
	sync::{mpsc, oneshot},
	time::MissedTickBehavior,
};
use tracing::{debug, error, info};

use crate::utils::RetryClient;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn transport_error(action: &str, e: ProviderError) -> ChainError {
	ChainError::Transport(format!("Failed to {}: {}", action, e))
}

/// EVM chain backend using the ethers-rs library.
///
/// Generic over the JSON-RPC transport so that any ethers client can be
/// plugged in; [`EthersChain::builder`] produces the retrying HTTP flavour.
pub struct EthersChain<P = RetryClient<Http>> {
	chain_id: ChainId,
	provider: Arc<Provider<P>>,
	ws_provider: Option<Arc<Provider<Ws>>>,
	poll_interval: Duration,
	request_timeout: Duration,
}

/// Builder for creating EthersChain instances.
pub struct EthersChainBuilder {
	chain_id: ChainId,
	endpoint: String,
	ws_endpoint: Option<String>,
	max_retries: u32,
	poll_interval: Duration,
	request_timeout: Duration,
}

impl EthersChain<RetryClient<Http>> {
	/// Creates a new EthersChain builder.
	pub fn builder(chain_id: ChainId, endpoint: &str) -> EthersChainBuilder {
		EthersChainBuilder {
			chain_id,
			endpoint: endpoint.to_string(),
			ws_endpoint: None,
			max_retries: 3,
			poll_interval: DEFAULT_POLL_INTERVAL,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}

	/// Creates a builder from configuration.
	pub fn builder_from_config(chain_id: ChainId, config: &ChainConfig) -> EthersChainBuilder {
		let mut builder = Self::builder(chain_id, &config.rpc_url)
			.with_max_retries(config.max_retries)
			.with_poll_interval(config.poll_interval())
			.with_request_timeout(config.request_timeout());
		if let Some(ws_url) = &config.ws_url {
			builder = builder.with_ws_endpoint(ws_url);
		}
		builder
	}
}

impl<P> EthersChain<P>
where
	P: JsonRpcClient + 'static,
{
	/// Wraps an existing provider. Heads are polled and the chain ID is
	/// taken on trust.
	pub fn from_provider(chain_id: ChainId, provider: Provider<P>) -> Self {
		Self {
			chain_id,
			provider: Arc::new(provider),
			ws_provider: None,
			poll_interval: DEFAULT_POLL_INTERVAL,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
		self.request_timeout = request_timeout;
		self
	}

	pub fn chain_id(&self) -> ChainId {
		self.chain_id
	}

	/// Maps a query number to an ethers block id.
	///
	/// Returns `None` for numbers that cannot be expressed as a JSON-RPC
	/// quantity, which no real chain has reached.
	fn block_id(number: Option<BlockNumber>) -> Option<BlockId> {
		match number {
			None => Some(EthersBlockNumber::Latest.into()),
			Some(n) if n <= U256::from(u64::MAX) => {
				Some(EthersBlockNumber::Number(n.as_u64().into()).into())
			}
			Some(_) => None,
		}
	}

	/// Converts an ethers block to a chain block.
	///
	/// Only pending blocks lack a number, and those are never requested.
	fn from_ethers_block(block: EthersBlock<TxHash>) -> Result<Block> {
		let number = block
			.number
			.ok_or_else(|| ChainError::Transport("Node returned a block without number".into()))?;

		if block.timestamp > U256::from(u64::MAX) {
			return Err(ChainError::Transport(format!(
				"Block {} timestamp {} out of range",
				number, block.timestamp
			)));
		}

		let header = Header {
			number: U256::from(number.as_u64()),
			hash: block.hash,
			parent_hash: block.parent_hash,
			timestamp: block.timestamp.as_u64(),
		};

		Ok(Block::new(header).with_transactions(block.transactions))
	}

	async fn fetch_block(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Block> {
		let ctx = ctx.with_timeout(self.request_timeout);
		ctx.run(async {
			let describe = || match number {
				Some(n) => format!("block {}", n),
				None => "latest block".to_string(),
			};

			let id = Self::block_id(number).ok_or_else(|| ChainError::NotFound(describe()))?;
			debug!("Getting {} on chain {}", describe(), self.chain_id);

			let block = self
				.provider
				.get_block(id)
				.await
				.map_err(|e| transport_error("get block", e))?;

			match block {
				Some(b) => Self::from_ethers_block(b),
				None => Err(ChainError::NotFound(describe())),
			}
		})
		.await
	}

	/// Starts a polling head feed. The current head is read up front so that
	/// an unreachable node fails the subscribe call itself.
	async fn subscribe_polling(
		&self,
		ctx: &Context,
		sink: mpsc::Sender<Header>,
		feed: SubscriptionHandle,
	) -> Result<()> {
		let head = self.fetch_block(ctx, None).await?.into_header();
		debug!(
			"Polling heads on chain {} every {:?} from {}",
			self.chain_id, self.poll_interval, head.number
		);

		tokio::spawn(poll_heads(
			self.provider.clone(),
			self.chain_id,
			self.poll_interval,
			head,
			sink,
			feed,
		));
		Ok(())
	}

	/// Starts a `newHeads` feed over WebSocket. The feed task owns the
	/// stream and reports back once the node has accepted the subscription.
	async fn subscribe_ws(
		&self,
		ctx: &Context,
		ws: Arc<Provider<Ws>>,
		sink: mpsc::Sender<Header>,
		feed: SubscriptionHandle,
	) -> Result<()> {
		let (ready_tx, ready_rx) = oneshot::channel();
		let chain_id = self.chain_id;
		let task_feed = feed.clone();

		tokio::spawn(async move {
			let established = ws.subscribe_blocks().await;
			// Dropping the stream unsubscribes on the node
			stream_heads(established, ready_tx, chain_id, sink, task_feed).await;
		});

		await_feed_ready(ctx, ready_rx, &feed).await
	}
}

/// Waits until the feed task reports whether the node accepted the
/// subscription.
///
/// If `ctx` fires first the subscription is failed, so a late acceptance
/// makes the feed task stop instead of delivering to an abandoned sink.
async fn await_feed_ready(
	ctx: &Context,
	ready: oneshot::Receiver<Result<()>>,
	feed: &SubscriptionHandle,
) -> Result<()> {
	let established = ctx
		.run(async {
			ready.await.map_err(|_| {
				ChainError::Transport("Head subscription task exited".to_string())
			})?
		})
		.await;

	if let Err(e) = established {
		feed.fail(e.clone());
		return Err(e);
	}
	Ok(())
}

/// Body of a pushed head feed: reports the establishment outcome on `ready`,
/// then forwards every block of `stream` until the subscription closes.
async fn stream_heads<S>(
	established: std::result::Result<S, ProviderError>,
	ready: oneshot::Sender<Result<()>>,
	chain_id: ChainId,
	sink: mpsc::Sender<Header>,
	feed: SubscriptionHandle,
) where
	S: Stream<Item = EthersBlock<TxHash>> + Unpin,
{
	let mut stream = match established {
		Ok(stream) => {
			let _ = ready.send(Ok(()));
			stream
		}
		Err(e) => {
			let _ = ready.send(Err(transport_error("subscribe to new heads", e)));
			return;
		}
	};

	loop {
		let next = tokio::select! {
			biased;
			_ = feed.closed() => break,
			next = stream.next() => next,
		};

		let header = match next.map(EthersChain::<Ws>::from_ethers_block) {
			Some(Ok(block)) => block.into_header(),
			Some(Err(e)) => {
				feed.fail(e);
				break;
			}
			None => {
				error!("Head subscription on chain {} ended", chain_id);
				feed.fail(ChainError::Transport(
					"Head subscription stream ended".to_string(),
				));
				break;
			}
		};

		if !feed.deliver(&sink, header).await {
			break;
		}
	}
	debug!("Head feed for chain {} stopped", chain_id);
}

impl EthersChainBuilder {
	/// Subscribes to heads over this WebSocket endpoint instead of polling.
	pub fn with_ws_endpoint(mut self, ws_endpoint: &str) -> Self {
		self.ws_endpoint = Some(ws_endpoint.to_string());
		self
	}

	/// Sets the maximum number of retry attempts.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
		self.request_timeout = request_timeout;
		self
	}

	/// Connects to the configured endpoints and builds the EthersChain.
	///
	/// # Errors
	///
	/// Returns `ChainError::Config` for malformed endpoints or a chain ID
	/// mismatch, and `ChainError::Transport` if a node cannot be reached.
	pub async fn build(self) -> Result<EthersChain> {
		info!(
			"Creating Ethers chain for chain {} at {} with max_retries={}",
			self.chain_id, self.endpoint, self.max_retries
		);

		let http_client = Http::from_str(&self.endpoint)
			.map_err(|e| ChainError::Config(format!("Invalid RPC endpoint: {}", e)))?;

		let retry_client = RetryClient::new(http_client).with_max_retries(self.max_retries);
		let provider = Provider::new(retry_client);
		verify_chain_id(&provider, self.chain_id).await?;

		let ws_provider = match &self.ws_endpoint {
			Some(url) => {
				info!("Connecting head feed for chain {} at {}", self.chain_id, url);
				let ws = Provider::<Ws>::connect(url.as_str())
					.await
					.map_err(|e| transport_error("connect WebSocket", e))?;
				verify_chain_id(&ws, self.chain_id).await?;
				Some(Arc::new(ws))
			}
			None => None,
		};

		Ok(EthersChain {
			chain_id: self.chain_id,
			provider: Arc::new(provider),
			ws_provider,
			poll_interval: self.poll_interval,
			request_timeout: self.request_timeout,
		})
	}
}

async fn verify_chain_id<P: JsonRpcClient>(provider: &Provider<P>, expected: ChainId) -> Result<()> {
	let actual = provider
		.get_chainid()
		.await
		.map_err(|e| transport_error("get chain ID", e))?;

	if actual != U256::from(expected.0) {
		return Err(ChainError::Config(format!(
			"Chain ID mismatch: expected {}, got {}",
			expected, actual
		)));
	}
	Ok(())
}

/// Polls the latest block and delivers every change of head number or hash.
async fn poll_heads<P>(
	provider: Arc<Provider<P>>,
	chain_id: ChainId,
	poll_interval: Duration,
	mut last: Header,
	sink: mpsc::Sender<Header>,
	feed: SubscriptionHandle,
) where
	P: JsonRpcClient + 'static,
{
	let mut ticker = tokio::time::interval(poll_interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// The first tick fires immediately
	ticker.tick().await;

	loop {
		let fetched = tokio::select! {
			biased;
			_ = feed.closed() => break,
			fetched = async {
				ticker.tick().await;
				provider.get_block(EthersBlockNumber::Latest).await
			} => fetched,
		};

		let latest = match fetched {
			Ok(Some(block)) => match EthersChain::<P>::from_ethers_block(block) {
				Ok(block) => block.into_header(),
				Err(e) => {
					feed.fail(e);
					break;
				}
			},
			Ok(None) => continue,
			Err(e) => {
				error!("Polling head on chain {} failed: {}", chain_id, e);
				feed.fail(transport_error("poll latest block", e));
				break;
			}
		};

		if latest.number == last.number && latest.hash == last.hash {
			continue;
		}

		debug!("New head {} on chain {}", latest.number, chain_id);
		last = latest.clone();
		if !feed.deliver(&sink, latest).await {
			break;
		}
	}
	debug!("Head polling for chain {} stopped", chain_id);
}

#[async_trait]
impl<P> ChainReader for EthersChain<P>
where
	P: JsonRpcClient + 'static,
{
	async fn header_by_number(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Header> {
		self.fetch_block(ctx, number).await.map(Block::into_header)
	}

	async fn block_by_number(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Block> {
		self.fetch_block(ctx, number).await
	}

	async fn subscribe_new_head(
		&self,
		ctx: &Context,
		sink: mpsc::Sender<Header>,
	) -> Result<Box<dyn Subscription>> {
		let ctx = ctx.with_timeout(self.request_timeout);
		let handle = SubscriptionHandle::new();

		match &self.ws_provider {
			Some(ws) => self.subscribe_ws(&ctx, ws.clone(), sink, handle.clone()).await?,
			None => self.subscribe_polling(&ctx, sink, handle.clone()).await?,
		}

		info!("Subscribed to new heads on chain {}", self.chain_id);
		Ok(Box::new(handle) as Box<dyn Subscription>)
	}
}

#[async_trait]
impl<P> ContractTransactor for EthersChain<P>
where
	P: JsonRpcClient + 'static,
{
	async fn pending_nonce_at(&self, ctx: &Context, account: Address) -> Result<u64> {
		let ctx = ctx.with_timeout(self.request_timeout);
		ctx.run(async {
			debug!(
				"Getting pending nonce for {} on chain {}",
				account.terminal_string(),
				self.chain_id
			);

			let count = self
				.provider
				.get_transaction_count(H160::from(account), Some(EthersBlockNumber::Pending.into()))
				.await
				.map_err(|e| transport_error("get pending nonce", e))?;

			if count > U256::from(u64::MAX) {
				return Err(ChainError::Transport(format!(
					"Nonce {} out of range",
					count
				)));
			}
			Ok(count.as_u64())
		})
		.await
	}
}
