//! Ethereum Virtual Machine (EVM) compatible chain backends.
//!
//! Available implementations:
//! - `EthersChain`: Uses the ethers-rs library

mod ethers_chain;

pub use ethers_chain::{EthersChain, EthersChainBuilder};
