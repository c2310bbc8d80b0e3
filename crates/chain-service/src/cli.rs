//! Command-line interface definitions.

use chain_types::{Address, ChainId};
use clap::{Parser, Subcommand};
use std::{num::NonZeroUsize, path::PathBuf};

#[derive(Parser, Debug)]
#[command(name = "chain-watch")]
#[command(about = "Inspect and follow Ethereum-style chains", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
	/// Path to configuration file
	#[arg(short, long, env = "CONFIG_FILE")]
	pub config: Option<PathBuf>,

	/// Log level override (trace, debug, info, warn, error)
	#[arg(short, long, env = "CHAIN_LOG_LEVEL")]
	pub log_level: Option<String>,

	/// Subcommand to execute
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Print a block header
	#[command(about = "Fetch a block header, the latest one unless --number is given")]
	Head {
		#[arg(long)]
		chain: ChainId,

		/// Block number to fetch
		#[arg(long)]
		number: Option<u64>,
	},

	/// Print the pending nonce of an account
	Nonce {
		#[arg(long)]
		chain: ChainId,

		/// Account address, hex encoded
		address: Address,
	},

	/// Follow new heads until interrupted
	#[command(about = "Subscribe to new heads and log each one")]
	Watch {
		#[arg(long)]
		chain: ChainId,

		/// Stop after this many heads
		#[arg(long)]
		count: Option<NonZeroUsize>,
	},

	/// Validate configuration file
	Validate,
}
