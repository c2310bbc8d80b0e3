//! Configuration for chain clients.
//!
//! Configuration is read from TOML or JSON files, then selectively overridden
//! from the environment and validated before any client is built.

pub mod loader;
pub mod serde_helpers;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{ChainConfig, ClientConfig, LoggingConfig};
