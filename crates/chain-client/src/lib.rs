//! Chain backends for the capability traits in `chain-types`.
//!
//! # Architecture
//!
//! - `implementations`: concrete backends, `EthersChain` for JSON-RPC nodes
//!   and `MemoryChain` for in-process use
//! - `registry`: keeps one `Chain` handle per chain ID
//! - `utils`: retrying JSON-RPC transport

pub mod implementations;
pub mod registry;
pub mod utils;

pub use implementations::evm::{EthersChain, EthersChainBuilder};
pub use implementations::memory::MemoryChain;
pub use registry::ChainRegistry;
