//! Registry of chain handles.
//!
//! The `ChainRegistry` maps chain IDs to `Chain` handles so that callers can
//! look up the chain they need without threading every handle through.
//!
//! # Thread Safety
//!
//! The registry itself is not thread-safe. If you need to share it across
//! threads, wrap it in an appropriate synchronization primitive (e.g., `Arc<Mutex<_>>`).
//! The handles stored in the registry are already wrapped in `Arc` for safe sharing.

use crate::implementations::evm::EthersChain;
use chain_config::ClientConfig;
use chain_types::{Chain, ChainError, ChainId, Result};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, info};

/// Chain handles indexed by chain ID.
pub struct ChainRegistry {
	chains: HashMap<ChainId, Arc<dyn Chain>>,
}

impl ChainRegistry {
	/// Creates a new empty registry.
	pub fn new() -> Self {
		Self {
			chains: HashMap::new(),
		}
	}

	/// Registers the handle for `chain_id`.
	///
	/// # Errors
	///
	/// Returns `ChainError::Config` if the chain is already registered.
	pub fn register(&mut self, chain_id: ChainId, chain: Arc<dyn Chain>) -> Result<()> {
		info!("Registering chain {}", chain_id);

		if self.chains.contains_key(&chain_id) {
			return Err(ChainError::Config(format!(
				"Chain {} already registered",
				chain_id
			)));
		}

		self.chains.insert(chain_id, chain);
		Ok(())
	}

	pub fn get(&self, chain_id: &ChainId) -> Option<Arc<dyn Chain>> {
		self.chains.get(chain_id).cloned()
	}

	/// Like [`ChainRegistry::get`], but a missing chain is an error.
	///
	/// # Errors
	///
	/// Returns `ChainError::NotFound` if the chain is not registered.
	pub fn get_required(&self, chain_id: &ChainId) -> Result<Arc<dyn Chain>> {
		self.get(chain_id)
			.ok_or_else(|| ChainError::NotFound(format!("Chain {} not configured", chain_id)))
	}

	/// Returns the registered chain IDs in ascending order.
	pub fn chains(&self) -> Vec<ChainId> {
		let mut ids: Vec<ChainId> = self.chains.keys().copied().collect();
		ids.sort();
		ids
	}

	/// Connects to every chain in `config` and registers an `EthersChain`
	/// for each.
	///
	/// # Errors
	///
	/// Returns an error if any chain fails to connect or reports a different
	/// chain ID than configured.
	pub async fn from_config(config: &ClientConfig) -> Result<Self> {
		let mut registry = Self::new();

		for (chain_id, chain_config) in &config.chains {
			debug!(
				"Connecting to chain {} ({}) at {}",
				chain_id, chain_config.name, chain_config.rpc_url
			);

			let chain = EthersChain::builder_from_config(*chain_id, chain_config)
				.build()
				.await?;
			registry.register(*chain_id, Arc::new(chain))?;
		}

		Ok(registry)
	}
}

impl Default for ChainRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ChainRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChainRegistry")
			.field("chains", &self.chains())
			.finish()
	}
}
