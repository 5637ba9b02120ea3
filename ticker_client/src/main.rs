//! Ticker Client: keeps a filtered list of tickers live over a hub push channel and
//! logs every merged snapshot.
//!
//! It reads the ticker universe from a text file, applies the `--exchange`/`--query`
//! filter, joins one hub group per symbol in the result, and merges pushed
//! `ReceiveTickerUpdate` events into the list until Ctrl+C, when it leaves every group
//! and disconnects.
//!
//! Usage example (CLI):
//! ```bash
//! ticker_client --hub-addr 127.0.0.1:8090 --path ./tickers.txt --exchange NASDAQ
//! ```
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use crossbeam_channel::{Sender, unbounded};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use ticker_client::config::SessionConfig;
use ticker_client::feed::{FeedCommand, FeedView, TickerFeed};
use ticker_client::session::ConnectionSession;
use ticker_client::source::{FileTickerSource, TickerFilter};
use ticker_common::net::TICKER_UPDATE_EVENT;
use ticker_common::{Result, SyncError, TickerUpdate};

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let file_path = normalize_path(&args.path);
    if !is_file_exist(&file_path) {
        return Err(SyncError::Format(format!(
            "Ticker file not found: {}",
            file_path.display()
        )));
    }

    let config = SessionConfig {
        hub_addr: args.hub_addr.trim().replace('"', ""),
        ping_interval: Duration::from_millis(args.ping_interval_ms),
        ..SessionConfig::default()
    };
    let filter = TickerFilter {
        exchange: args.exchange,
        query: args.query,
    };
    info!("Hub: {}, filter: {:?}", config.hub_addr, filter);

    let (session, session_events) = ConnectionSession::new(config);
    let session = Arc::new(session);

    let (updates_tx, updates_rx) = unbounded::<TickerUpdate>();
    let subscription = session.on(TICKER_UPDATE_EVENT, move |payload| {
        match serde_json::from_value::<TickerUpdate>(payload.clone()) {
            Ok(update) => {
                if updates_tx.send(update).is_err() {
                    debug!("Ticker update dropped: feed is gone");
                }
            }
            Err(e) => warn!("Malformed ticker update: {e}"),
        }
    });

    let (commands_tx, commands_rx) = unbounded::<FeedCommand>();
    {
        let commands_tx = commands_tx.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            let _ = commands_tx.send(FeedCommand::Shutdown);
        })
        .map_err(|e| SyncError::Format(format!("Error setting Ctrl+C handler: {e}")))?;
    }
    if args.refresh_secs > 0 {
        start_refresh_thread(commands_tx.clone(), Duration::from_secs(args.refresh_secs));
    }

    let mut feed = TickerFeed::new(
        FileTickerSource::new(file_path),
        Arc::clone(&session),
        log_snapshot,
        filter,
    );
    feed.attach(subscription);

    session.connect()?;
    feed.refetch();

    info!("Client is running. Press Ctrl+C to exit.");
    let report = feed.run(commands_rx, session_events, updates_rx);
    if !report.failed.is_empty() {
        warn!("Could not leave: {:?}", report.failed);
    }
    session.disconnect();
    Ok(())
}

fn start_refresh_thread(commands_tx: Sender<FeedCommand>, interval: Duration) {
    thread::spawn(move || {
        loop {
            thread::sleep(interval);
            if commands_tx.send(FeedCommand::Refetch).is_err() {
                break;
            }
        }
    });
}

fn log_snapshot(view: &FeedView) {
    if view.is_loading {
        debug!("Loading tickers...");
        return;
    }
    if let Some(error) = &view.error {
        warn!("Showing stale tickers: {error}");
    }
    let rows: Vec<String> = view
        .tickers
        .iter()
        .map(|t| match (t.price, t.change_percent) {
            (Some(price), Some(pct)) => format!("{} {:.2} ({:+.2}%)", t.symbol, price, pct),
            (Some(price), None) => format!("{} {:.2}", t.symbol, price),
            _ => format!("{} -", t.symbol),
        })
        .collect();
    info!("TICKERS [{}]: {}", rows.len(), rows.join(" | "));
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}

/// Returns `true` if the provided path exists and is a regular file.
fn is_file_exist(path: &PathBuf) -> bool {
    path.exists() && path.is_file()
}
