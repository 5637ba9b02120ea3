//! Command-line arguments for the Ticker Client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use ticker_common::net::{HUB_PORT, addr};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Hub address as `host:port`.
    #[clap(long, default_value_t = addr("127.0.0.1", HUB_PORT))]
    pub hub_addr: String,

    /// Path to the ticker universe file, one `SYMBOL[,NAME[,EXCHANGE]]` per line.
    #[clap(long)]
    pub path: String,

    /// Only show tickers listed on this exchange.
    #[clap(long)]
    pub exchange: Option<String>,

    /// Only show tickers whose symbol starts with, or whose name contains, this text.
    #[clap(long)]
    pub query: Option<String>,

    /// Interval between keep-alive pings, in milliseconds.
    #[clap(long, default_value_t = 2000)]
    pub ping_interval_ms: u64,

    /// Re-read the universe file every N seconds. 0 disables periodic refresh.
    #[clap(long, default_value_t = 0)]
    pub refresh_secs: u64,
}
