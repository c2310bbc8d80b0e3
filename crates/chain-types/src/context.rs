//! Cancellation and deadline propagation for chain calls.
//!
//! A [`Context`] is threaded through every call that may block on the
//! backend. It fires when any of its cancellation signals is raised or when
//! its deadline passes, whichever comes first. Derived contexts inherit the
//! signals and deadline of their parent, so cancelling a parent cancels every
//! child derived from it while cancelling a child leaves the parent alone.

use crate::errors::{ChainError, Result};
use futures::future;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};

/// Cancellation signal and deadline carried into a chain call.
#[derive(Debug, Clone, Default)]
pub struct Context {
	signals: Vec<watch::Receiver<bool>>,
	deadline: Option<Instant>,
}

/// Cancels the context it was created with, and everything derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
	signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
	/// Raises the signal. Calling it more than once has no further effect.
	pub fn cancel(&self) {
		self.signal.send_replace(true);
	}

	pub fn is_cancelled(&self) -> bool {
		*self.signal.borrow()
	}
}

impl Context {
	/// A context that never fires.
	pub fn background() -> Self {
		Self::default()
	}

	/// Derives a context that additionally fires when the returned handle is
	/// cancelled.
	pub fn with_cancel(&self) -> (Context, CancelHandle) {
		let (tx, rx) = watch::channel(false);
		let mut child = self.clone();
		child.signals.push(rx);
		(
			child,
			CancelHandle {
				signal: Arc::new(tx),
			},
		)
	}

	/// Derives a context that expires at `deadline`, or at the parent's
	/// deadline if that is earlier.
	pub fn with_deadline(&self, deadline: Instant) -> Context {
		let mut child = self.clone();
		child.deadline = Some(match self.deadline {
			Some(current) => current.min(deadline),
			None => deadline,
		});
		child
	}

	/// Derives a context that expires after `timeout`.
	pub fn with_timeout(&self, timeout: Duration) -> Context {
		self.with_deadline(Instant::now() + timeout)
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Returns the reason the context fired, or `None` while it is live.
	pub fn err(&self) -> Option<ChainError> {
		if self.signals.iter().any(|rx| *rx.borrow()) {
			return Some(ChainError::Cancelled);
		}
		match self.deadline {
			Some(deadline) if Instant::now() >= deadline => Some(ChainError::DeadlineExceeded),
			_ => None,
		}
	}

	/// Resolves once the context fires, with the reason.
	pub async fn done(&self) -> ChainError {
		if let Some(err) = self.err() {
			return err;
		}

		let cancelled = async {
			if self.signals.is_empty() {
				return future::pending::<()>().await;
			}
			let waits = self.signals.iter().cloned().map(|mut rx| {
				Box::pin(async move {
					// A dropped handle can no longer cancel
					let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
					if !fired {
						future::pending::<()>().await;
					}
				})
			});
			future::select_all(waits).await;
		};

		let expired = async {
			match self.deadline {
				Some(deadline) => tokio::time::sleep_until(deadline).await,
				None => future::pending::<()>().await,
			}
		};

		tokio::select! {
			_ = cancelled => ChainError::Cancelled,
			_ = expired => ChainError::DeadlineExceeded,
		}
	}

	/// Runs `fut` until it completes or the context fires.
	///
	/// If the context has already fired the future is never polled.
	pub async fn run<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		if let Some(err) = self.err() {
			return Err(err);
		}

		tokio::select! {
			biased;
			err = self.done() => Err(err),
			result = fut => result,
		}
	}
}
