//! Chain-related types and capability traits.

use crate::{
	address::Address,
	block::{Block, Header},
	common::BlockNumber,
	context::Context,
	errors::Result,
	subscription::Subscription,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::mpsc;

/// Chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
	pub const ETHEREUM: Self = Self(1);
	pub const OPTIMISM: Self = Self(10);
	pub const POLYGON: Self = Self(137);
	pub const BASE: Self = Self(8453);
	pub const ARBITRUM: Self = Self(42161);
	pub const SEPOLIA: Self = Self(11155111);
}

impl fmt::Display for ChainId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChainId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Ok(ChainId(s.parse()?))
	}
}

/// Read access to the canonical chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Get a block header by number, or the current head when `number` is
	/// `None`.
	///
	/// Fails with `ChainError::NotFound` if no block with that number is
	/// known yet, and with a context error once `ctx` fires.
	async fn header_by_number(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Header>;

	/// Get a full block by number, or the current head block when `number`
	/// is `None`.
	async fn block_by_number(&self, ctx: &Context, number: Option<BlockNumber>) -> Result<Block>;

	/// Subscribe to changes of the canonical head.
	///
	/// Returns once the feed is established; new heads are then pushed into
	/// `sink` from a separate task. `ctx` only bounds the establishment: the
	/// returned subscription lives until it is unsubscribed or fails.
	async fn subscribe_new_head(
		&self,
		ctx: &Context,
		sink: mpsc::Sender<Header>,
	) -> Result<Box<dyn Subscription>>;
}

/// The data needed to build and submit transactions.
#[async_trait]
pub trait ContractTransactor: Send + Sync {
	/// Get the next nonce for `account`, counting transactions that are
	/// pending but not yet mined.
	async fn pending_nonce_at(&self, ctx: &Context, account: Address) -> Result<u64>;
}

/// A full chain handle: reads and nonce lookups against one chain view.
pub trait Chain: ChainReader + ContractTransactor {}

impl<T> Chain for T where T: ChainReader + ContractTransactor + ?Sized {}
