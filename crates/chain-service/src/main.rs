use anyhow::{Context as _, Result};
use chain_client::ChainRegistry;
use chain_config::{ClientConfig, ConfigLoader};
use chain_types::{Address, ChainId, Context, U256};
use clap::Parser;
use std::{num::NonZeroUsize, path::Path, time::Duration};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod watch;

use cli::{Args, Command};
use watch::{follow_heads, log_header};

/// Upper bound for one-shot queries issued from the command line.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Level used until the configuration is loaded, unless set on the command line.
const BOOTSTRAP_LOG_LEVEL: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();

	let bootstrap_level = args.log_level.as_deref().unwrap_or(BOOTSTRAP_LOG_LEVEL);
	let config = load_config(args.config.as_deref(), bootstrap_level, std::io::stdout)?;

	let log_level = args
		.log_level
		.clone()
		.unwrap_or_else(|| config.logging.level.clone());
	setup_tracing(&log_level, config.logging.json)?;

	match args.command {
		Command::Head { chain, number } => show_header(&config, chain, number).await,
		Command::Nonce { chain, address } => show_nonce(&config, chain, address).await,
		Command::Watch { chain, count } => watch_heads(&config, chain, count).await,
		Command::Validate => validate_config(&config),
	}
}

/// Loads the configuration with a plain subscriber installed for the
/// duration of the load, so the loader's own logs are not lost.
fn load_config<W>(path: Option<&Path>, log_level: &str, writer: W) -> Result<ClientConfig>
where
	W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
	let bootstrap = tracing_subscriber::fmt()
		.with_env_filter(env_filter(log_level))
		.with_writer(writer)
		.finish();

	tracing::subscriber::with_default(bootstrap, || ConfigLoader::from_env_and_file(path))
		.context("Failed to load configuration")
}

async fn show_header(config: &ClientConfig, chain_id: ChainId, number: Option<u64>) -> Result<()> {
	let registry = ChainRegistry::from_config(config)
		.await
		.context("Failed to connect to chains")?;
	let chain = registry.get_required(&chain_id)?;

	let ctx = Context::background().with_timeout(QUERY_TIMEOUT);
	let header = chain
		.header_by_number(&ctx, number.map(U256::from))
		.await
		.with_context(|| format!("Failed to fetch header from chain {}", chain_id))?;

	log_header(chain_id, &header);
	Ok(())
}

async fn show_nonce(config: &ClientConfig, chain_id: ChainId, address: Address) -> Result<()> {
	let registry = ChainRegistry::from_config(config)
		.await
		.context("Failed to connect to chains")?;
	let chain = registry.get_required(&chain_id)?;

	let ctx = Context::background().with_timeout(QUERY_TIMEOUT);
	let nonce = chain
		.pending_nonce_at(&ctx, address)
		.await
		.with_context(|| format!("Failed to fetch nonce from chain {}", chain_id))?;

	info!(
		"Pending nonce of {} on chain {}: {}",
		address.terminal_string(),
		chain_id,
		nonce
	);
	Ok(())
}

async fn watch_heads(
	config: &ClientConfig,
	chain_id: ChainId,
	count: Option<NonZeroUsize>,
) -> Result<()> {
	let registry = ChainRegistry::from_config(config)
		.await
		.context("Failed to connect to chains")?;
	let chain = registry.get_required(&chain_id)?;

	let ctx = Context::background().with_timeout(QUERY_TIMEOUT);
	follow_heads(chain.as_ref(), &ctx, chain_id, count, shutdown_signal()).await?;
	Ok(())
}

fn validate_config(config: &ClientConfig) -> Result<()> {
	info!("Configuration is valid");
	info!("Configured chains:");

	let mut chain_ids: Vec<&ChainId> = config.chains.keys().collect();
	chain_ids.sort();

	for chain_id in chain_ids {
		let chain = &config.chains[chain_id];
		match &chain.ws_url {
			Some(ws_url) => info!("  {} ({}): {} / {}", chain_id, chain.name, chain.rpc_url, ws_url),
			None => info!(
				"  {} ({}): {}, polling every {:?}",
				chain_id,
				chain.name,
				chain.rpc_url,
				chain.poll_interval()
			),
		}
	}

	Ok(())
}

fn setup_tracing(log_level: &str, json: bool) -> Result<()> {
	let env_filter = env_filter(log_level);

	let (json_layer, text_layer) = if json {
		(Some(tracing_subscriber::fmt::layer().json()), None)
	} else {
		(None, Some(tracing_subscriber::fmt::layer()))
	};

	tracing_subscriber::registry()
		.with(env_filter)
		.with(json_layer)
		.with(text_layer)
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

/// `RUST_LOG` if set, otherwise `log_level`.
fn env_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl+C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!("Failed to install SIGTERM handler: {}", e);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::{
		io::{self, Write},
		sync::{Arc, Mutex},
	};

	#[derive(Clone, Default)]
	struct Captured(Arc<Mutex<Vec<u8>>>);

	impl Write for Captured {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	#[test]
	fn test_config_load_is_logged() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		file.write_all(
			b"[chains.1]\nname = \"Ethereum\"\nrpc_url = \"https://eth.example.com\"\n",
		)
		.unwrap();

		let captured = Captured::default();
		let writer = captured.clone();
		let config = load_config(Some(file.path()), "info", move || writer.clone()).unwrap();
		assert!(config.chains.contains_key(&ChainId::ETHEREUM));

		let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
		assert!(output.contains("Loading configuration from"), "{}", output);
	}

	#[test]
	fn test_config_load_failure() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("absent.toml");

		let result = load_config(Some(&missing), "info", io::sink);
		assert!(result.is_err());
	}
}
