//! Block header and block snapshots.

use crate::common::{BlockNumber, Bytes32, Timestamp, TxHash};
use serde::{Deserialize, Serialize};

/// Snapshot of a block header at a point in time.
///
/// Headers returned by a chain always carry a concrete number. "Latest" is
/// only ever expressed as an absent number in a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
	pub number: BlockNumber,
	/// Missing for pending blocks.
	pub hash: Option<Bytes32>,
	pub parent_hash: Bytes32,
	pub timestamp: Timestamp,
}

impl Header {
	pub fn new(number: impl Into<BlockNumber>) -> Self {
		Self {
			number: number.into(),
			hash: None,
			parent_hash: Bytes32::zero(),
			timestamp: 0,
		}
	}

	pub fn with_hash(mut self, hash: Bytes32) -> Self {
		self.hash = Some(hash);
		self
	}

	pub fn with_parent_hash(mut self, parent_hash: Bytes32) -> Self {
		self.parent_hash = parent_hash;
		self
	}

	pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
		self.timestamp = timestamp;
		self
	}
}

/// A block: exactly one header plus the hashes of its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	header: Header,
	transactions: Vec<TxHash>,
}

impl Block {
	pub fn new(header: Header) -> Self {
		Self {
			header,
			transactions: Vec::new(),
		}
	}

	pub fn with_transactions(mut self, transactions: Vec<TxHash>) -> Self {
		self.transactions = transactions;
		self
	}

	pub fn header(&self) -> &Header {
		&self.header
	}

	pub fn number(&self) -> BlockNumber {
		self.header.number
	}

	pub fn transactions(&self) -> &[TxHash] {
		&self.transactions
	}

	pub fn into_header(self) -> Header {
		self.header
	}
}

impl From<Header> for Block {
	fn from(header: Header) -> Self {
		Self::new(header)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::common::U256;

	#[test]
	fn test_header_builders() {
		let header = Header::new(42u64)
			.with_hash(Bytes32::repeat_byte(0xaa))
			.with_parent_hash(Bytes32::repeat_byte(0xbb))
			.with_timestamp(1_700_000_000);

		assert_eq!(header.number, U256::from(42));
		assert_eq!(header.hash, Some(Bytes32::repeat_byte(0xaa)));
		assert_eq!(header.parent_hash, Bytes32::repeat_byte(0xbb));
		assert_eq!(header.timestamp, 1_700_000_000);
	}

	#[test]
	fn test_header_number_beyond_u64() {
		let number = U256::from(u64::MAX) + U256::one();
		let header = Header::new(number);
		assert_eq!(header.number, number);
	}

	#[test]
	fn test_block_owns_one_header() {
		let header = Header::new(7u64);
		let block = Block::new(header.clone()).with_transactions(vec![Bytes32::repeat_byte(1)]);

		assert_eq!(block.header(), &header);
		assert_eq!(block.number(), U256::from(7));
		assert_eq!(block.transactions().len(), 1);
		assert_eq!(block.into_header(), header);
	}
}
