//! Configuration loading from files and environment.

use crate::types::*;
use anyhow::{Context, Result};
use chain_types::ChainId;
use std::path::Path;
use tracing::{debug, info};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
	/// Load configuration from file
	pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
		let path = path.as_ref();
		info!("Loading configuration from {:?}", path);

		let contents = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {:?}", path))?;

		let config = match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Self::from_toml(&contents)?,
			Some("json") => Self::from_json(&contents)?,
			_ => anyhow::bail!("Unsupported config format: {:?}", path),
		};

		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Load from TOML string
	pub fn from_toml(contents: &str) -> Result<ClientConfig> {
		toml::from_str(contents).map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))
	}

	/// Load from JSON string
	pub fn from_json(contents: &str) -> Result<ClientConfig> {
		serde_json::from_str(contents).context("Failed to parse JSON")
	}

	/// Load from an optional file, then apply environment overrides
	pub fn from_env_and_file(file_path: Option<&Path>) -> Result<ClientConfig> {
		let mut config = match file_path {
			Some(path) => Self::from_file(path)?,
			None => ClientConfig::default(),
		};

		Self::apply_overrides(&mut config, std::env::vars());

		Self::validate_config(&config)?;
		Ok(config)
	}

	/// Apply overrides from `RPC_URL_<id>`, `WS_URL_<id>` and `CHAIN_LOG_LEVEL`.
	///
	/// URL overrides only touch chains that are already configured.
	pub fn apply_overrides<I>(config: &mut ClientConfig, vars: I)
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			if let Some(id) = key.strip_prefix("RPC_URL_") {
				if let Some(chain) = Self::chain_mut(config, id) {
					debug!("Overriding RPC URL for chain {} from environment", id);
					chain.rpc_url = value;
				}
			} else if let Some(id) = key.strip_prefix("WS_URL_") {
				if let Some(chain) = Self::chain_mut(config, id) {
					debug!("Overriding WebSocket URL for chain {} from environment", id);
					chain.ws_url = Some(value);
				}
			} else if key == "CHAIN_LOG_LEVEL" {
				debug!("Overriding log level from environment");
				config.logging.level = value;
			}
		}
	}

	fn chain_mut<'a>(config: &'a mut ClientConfig, id: &str) -> Option<&'a mut ChainConfig> {
		let chain_id = id.parse::<ChainId>().ok()?;
		config.chains.get_mut(&chain_id)
	}

	/// Validate configuration
	pub fn validate_config(config: &ClientConfig) -> Result<()> {
		if config.chains.is_empty() {
			anyhow::bail!("At least one chain must be configured");
		}

		for (chain_id, chain) in &config.chains {
			if !(chain.rpc_url.starts_with("http://") || chain.rpc_url.starts_with("https://")) {
				anyhow::bail!(
					"Chain {} RPC URL must be http(s): {}",
					chain_id,
					chain.rpc_url
				);
			}

			if let Some(ws_url) = &chain.ws_url {
				if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
					anyhow::bail!("Chain {} WebSocket URL must be ws(s): {}", chain_id, ws_url);
				}
			}

			if chain.poll_interval_ms == 0 {
				anyhow::bail!("Chain {} poll_interval_ms must be positive", chain_id);
			}

			if chain.request_timeout_secs == 0 {
				anyhow::bail!("Chain {} request_timeout_secs must be positive", chain_id);
			}
		}

		Ok(())
	}
}

/// Load configuration from standard locations
pub fn load_config() -> Result<ClientConfig> {
	// Check for config file in order:
	// 1. Environment variable CONFIG_FILE
	// 2. ./config.toml
	// 3. ./config/chain.toml

	if let Ok(path) = std::env::var("CONFIG_FILE") {
		return ConfigLoader::from_env_and_file(Some(Path::new(&path)));
	}

	let paths = ["./config.toml", "./config/chain.toml"];

	for path in &paths {
		if Path::new(path).exists() {
			return ConfigLoader::from_env_and_file(Some(Path::new(path)));
		}
	}

	ConfigLoader::from_env_and_file(None)
}
