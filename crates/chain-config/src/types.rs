//! Configuration types.

use crate::serde_helpers::{deserialize_chain_id_map, serialize_chain_id_map};
use chain_types::ChainId;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Chains to connect to, keyed by chain ID.
	#[serde(
		default,
		serialize_with = "serialize_chain_id_map",
		deserialize_with = "deserialize_chain_id_map"
	)]
	pub chains: HashMap<ChainId, ChainConfig>,
	#[serde(default)]
	pub logging: LoggingConfig,
}

/// Connection settings for one chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
	/// Human-readable name of the chain.
	pub name: String,
	/// HTTP/HTTPS JSON-RPC endpoint URL.
	pub rpc_url: String,
	/// WebSocket endpoint for head subscriptions. Without it heads are polled.
	#[serde(default)]
	pub ws_url: Option<String>,
	/// Interval between head polls when no WebSocket endpoint is set.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Maximum retry attempts per JSON-RPC request.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Upper bound on a single call, on top of the caller's own deadline.
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
}

impl ChainConfig {
	pub fn new(name: impl Into<String>, rpc_url: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			rpc_url: rpc_url.into(),
			ws_url: None,
			poll_interval_ms: default_poll_interval_ms(),
			max_retries: default_max_retries(),
			request_timeout_secs: default_request_timeout_secs(),
		}
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
	#[serde(default = "default_log_level")]
	pub level: String,
	/// Emit JSON lines instead of human-readable output.
	#[serde(default)]
	pub json: bool,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			level: default_log_level(),
			json: false,
		}
	}
}

fn default_poll_interval_ms() -> u64 {
	2000
}

fn default_max_retries() -> u32 {
	3
}

fn default_request_timeout_secs() -> u64 {
	30
}

fn default_log_level() -> String {
	"info".to_string()
}
