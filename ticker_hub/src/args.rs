//! Command-line arguments for the Ticker Hub.
use clap::Parser;
use ticker_common::net::{HUB_PORT, addr};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address to accept push-channel connections on.
    #[clap(long, default_value_t = addr("0.0.0.0", HUB_PORT))]
    pub bind: String,

    /// Interval between quote ticks for every symbol with members, in milliseconds.
    #[clap(long, default_value_t = 1000)]
    pub tick_ms: u64,

    /// Drop a client after this many seconds without any frame from it.
    #[clap(long, default_value_t = 5)]
    pub ping_timeout_secs: u64,

    /// Fraction of `JoinTickerGroup` calls to reject, between 0.0 and 1.0.
    #[clap(long, default_value_t = 0.0)]
    pub join_failure_rate: f64,
}
