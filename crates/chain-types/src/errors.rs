//! Error types for the chain client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

/// Failures surfaced by chain capabilities.
///
/// The type is `Clone` so that a subscription fault can be handed to every
/// caller waiting on the subscription outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
	/// The requested block does not exist (yet).
	#[error("Not found: {0}")]
	NotFound(String),

	/// The caller's context was cancelled before the call completed.
	#[error("Operation cancelled")]
	Cancelled,

	/// The caller's deadline expired before the call completed.
	#[error("Deadline exceeded")]
	DeadlineExceeded,

	/// The backend or the connection to it failed.
	#[error("Transport error: {0}")]
	Transport(String),

	#[error("Invalid length: expected {expected} bytes, got {actual}")]
	InvalidLength { expected: usize, actual: usize },

	#[error("Invalid address: {0}")]
	InvalidAddress(String),

	#[error("Configuration error: {0}")]
	Config(String),
}

impl ChainError {
	/// Returns true if the error was caused by the caller's context rather
	/// than by the backend.
	pub fn is_context_error(&self) -> bool {
		matches!(self, ChainError::Cancelled | ChainError::DeadlineExceeded)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_context_error_classification() {
		assert!(ChainError::Cancelled.is_context_error());
		assert!(ChainError::DeadlineExceeded.is_context_error());
		assert!(!ChainError::Transport("disconnected".to_string()).is_context_error());
		assert!(!ChainError::NotFound("block 7".to_string()).is_context_error());
	}

	#[test]
	fn test_error_display() {
		let err = ChainError::InvalidLength {
			expected: 20,
			actual: 19,
		};
		assert_eq!(err.to_string(), "Invalid length: expected 20 bytes, got 19");
		assert_eq!(ChainError::Cancelled.to_string(), "Operation cancelled");
	}
}
