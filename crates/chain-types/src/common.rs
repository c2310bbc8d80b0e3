//! Common types used throughout the chain client.

// Re-export commonly used ethereum types
pub use ethers_core::types::{H256 as Bytes32, U256};

/// Transaction hash
pub type TxHash = Bytes32;

/// Block number. Unsigned and wider than 64 bits.
pub type BlockNumber = U256;

/// Timestamp (Unix seconds)
pub type Timestamp = u64;
