//! Core types and capability traits for Ethereum-style chain clients.
//!
//! Application code depends on the narrowest capability it needs:
//!
//! - [`ChainReader`] for header lookup and head-change subscriptions
//! - [`ContractTransactor`] for the data needed to build a transaction
//! - [`Chain`] when both are required through a single handle
//!
//! Every potentially blocking call takes a [`Context`], which carries the
//! caller's cancellation signal and deadline.

pub mod address;
pub mod block;
pub mod chains;
pub mod common;
pub mod context;
pub mod errors;
pub mod subscription;

pub use address::Address;
pub use block::{Block, Header};
pub use chains::{Chain, ChainId, ChainReader, ContractTransactor};
pub use common::{BlockNumber, Bytes32, TxHash, U256};
pub use context::{CancelHandle, Context};
pub use errors::{ChainError, Result};
pub use subscription::{Subscription, SubscriptionHandle, SubscriptionState};
