//! Chain backend implementations.
//!
//! - **EVM chains**: Ethereum and EVM-compatible nodes via the `evm` module
//! - **Memory**: an in-process chain for development and tests

pub mod evm;
pub mod memory;
