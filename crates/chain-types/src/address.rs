//! Account and contract addresses.

use crate::errors::{ChainError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Number of bytes in an address.
pub const ADDRESS_LENGTH: usize = 20;

/// The 20 byte address of an account or contract.
///
/// Equality and ordering are byte-wise. There is no variable-length form: the
/// only fallible constructors are [`Address::from_slice`] and the `FromStr`
/// impl, both of which reject anything that is not exactly 20 bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
	pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
		Self(bytes)
	}

	pub const fn zero() -> Self {
		Self([0u8; ADDRESS_LENGTH])
	}

	/// Builds an address from a byte slice.
	///
	/// # Errors
	///
	/// Returns `ChainError::InvalidLength` unless the slice is exactly 20 bytes.
	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		let array: [u8; ADDRESS_LENGTH] =
			bytes.try_into().map_err(|_| ChainError::InvalidLength {
				expected: ADDRESS_LENGTH,
				actual: bytes.len(),
			})?;
		Ok(Self(array))
	}

	pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
		&self.0
	}

	/// Shortened form for logs and terminals: the first and last three bytes
	/// in hex around an ellipsis, e.g. `112233…ddeeff`.
	///
	/// Lossy, so never parse it back.
	pub fn terminal_string(&self) -> String {
		format!(
			"{}…{}",
			hex::encode(&self.0[..3]),
			hex::encode(&self.0[ADDRESS_LENGTH - 3..])
		)
	}
}

impl From<[u8; ADDRESS_LENGTH]> for Address {
	fn from(bytes: [u8; ADDRESS_LENGTH]) -> Self {
		Self(bytes)
	}
}

impl TryFrom<&[u8]> for Address {
	type Error = ChainError;

	fn try_from(bytes: &[u8]) -> Result<Self> {
		Self::from_slice(bytes)
	}
}

impl From<ethers_core::types::H160> for Address {
	fn from(address: ethers_core::types::H160) -> Self {
		Self(address.0)
	}
}

impl From<Address> for ethers_core::types::H160 {
	fn from(address: Address) -> Self {
		ethers_core::types::H160(address.0)
	}
}

impl AsRef<[u8]> for Address {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

impl fmt::Debug for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Address({})", self)
	}
}

impl FromStr for Address {
	type Err = ChainError;

	fn from_str(s: &str) -> Result<Self> {
		let digits = s
			.strip_prefix("0x")
			.or_else(|| s.strip_prefix("0X"))
			.unwrap_or(s);
		let bytes = hex::decode(digits)
			.map_err(|e| ChainError::InvalidAddress(format!("{}: {}", s, e)))?;
		Self::from_slice(&bytes)
	}
}

impl Serialize for Address {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Address {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}
