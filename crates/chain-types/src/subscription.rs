//! Event subscriptions with a single terminal outcome.
//!
//! A subscription starts `Active` and moves exactly once to either
//! `Unsubscribed` (the consumer cancelled it) or `Failed` (the feed broke).
//! Whichever happens first wins; later calls to [`Subscription::unsubscribe`]
//! or [`SubscriptionHandle::fail`] leave the outcome untouched, so at most one
//! error is ever observed.

use crate::errors::ChainError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
	Active,
	Unsubscribed,
	Failed(ChainError),
}

impl SubscriptionState {
	pub fn is_active(&self) -> bool {
		matches!(self, SubscriptionState::Active)
	}
}

/// A live event feed delivering into a consumer-supplied channel.
#[async_trait]
pub trait Subscription: Send + Sync {
	/// Stops delivery to the data channel and closes the subscription.
	///
	/// Safe to call any number of times, from any task, including while an
	/// event is being delivered or a fault is being reported.
	fn unsubscribe(&self);

	/// Waits for the subscription to close.
	///
	/// Resolves to `None` after a clean unsubscribe and to `Some(error)` if
	/// the feed failed. The same outcome is returned on every call.
	async fn err(&self) -> Option<ChainError>;

	/// Current state, without waiting.
	fn state(&self) -> SubscriptionState;
}

/// Shared handle between a subscription's consumer and its feed task.
///
/// The consumer holds it as a [`Subscription`]; the feed task keeps a clone
/// to check whether it should keep delivering and to report faults.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
	state: Arc<watch::Sender<SubscriptionState>>,
}

impl SubscriptionHandle {
	pub fn new() -> Self {
		let (state, _) = watch::channel(SubscriptionState::Active);
		Self {
			state: Arc::new(state),
		}
	}

	/// Closes the subscription with `error`.
	///
	/// Returns false if the subscription was already closed, in which case
	/// the error is dropped.
	pub fn fail(&self, error: ChainError) -> bool {
		self.close(SubscriptionState::Failed(error))
	}

	pub fn is_active(&self) -> bool {
		self.state.borrow().is_active()
	}

	/// Resolves once the subscription has left the `Active` state.
	pub async fn closed(&self) {
		let mut rx = self.state.subscribe();
		// The sender lives in `self`, so this cannot observe a dropped channel
		let _ = rx.wait_for(|state| !state.is_active()).await;
	}

	/// Hands `item` to the consumer unless the subscription closes first.
	///
	/// A dropped receiver counts as an unsubscribe. Returns false once the
	/// feed should stop.
	pub async fn deliver<T>(&self, sink: &mpsc::Sender<T>, item: T) -> bool {
		tokio::select! {
			biased;
			_ = self.closed() => false,
			sent = sink.send(item) => {
				if sent.is_err() {
					self.close(SubscriptionState::Unsubscribed);
					return false;
				}
				true
			}
		}
	}

	fn close(&self, outcome: SubscriptionState) -> bool {
		self.state.send_if_modified(|state| {
			if state.is_active() {
				*state = outcome;
				true
			} else {
				false
			}
		})
	}
}

impl Default for SubscriptionHandle {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl Subscription for SubscriptionHandle {
	fn unsubscribe(&self) {
		self.close(SubscriptionState::Unsubscribed);
	}

	async fn err(&self) -> Option<ChainError> {
		self.closed().await;
		match &*self.state.borrow() {
			SubscriptionState::Failed(error) => Some(error.clone()),
			_ => None,
		}
	}

	fn state(&self) -> SubscriptionState {
		self.state.borrow().clone()
	}
}
