//! Ticker Hub: a reference push-channel server for the ticker client.
//!
//! Clients connect over TCP and exchange newline-delimited JSON frames. The hub wires
//! together three building blocks:
//!
//! - `ConnectionReceiver`: accepts connections and turns their frames into
//!   `HubEvent`s, with one reader and one writer thread per connection.
//! - `Hub`: owns the group memberships, answers `JoinTickerGroup` and
//!   `LeaveTickerGroup` invocations, and forgets every membership of a client that
//!   disconnects or stops pinging.
//! - `QuoteGenerator`: moves the price of every symbol with members on each tick;
//!   the quote is pushed as a `ReceiveTickerUpdate` event to that symbol's group only.
//!
//! The main loop multiplexes receiver events, the quote tick, the keep-alive check
//! and Ctrl+C with crossbeam `select!`.
//!
//! Usage example (CLI):
//! ```bash
//! ticker_hub --bind 0.0.0.0:8090 --tick-ms 500 --ping-timeout-secs 5
//! ```
#![warn(missing_docs)]
use crate::args::Args;
use crate::hub::Hub;
use crate::receiver::{ConnectionReceiver, HubEvent};
use clap::Parser;
use crossbeam_channel::{select, tick, unbounded};
use log::{error, info};
use std::thread;
use std::time::Duration;
use ticker_common::{Result, SyncError};

mod args;
mod hub;
mod model;
mod receiver;

const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let (shutdown_tx, shutdown_rx) = unbounded::<()>();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received. Shutting down hub...");
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| SyncError::Format(format!("Error setting Ctrl+C handler: {e}")))?;

    let (events_tx, events_rx) = unbounded::<HubEvent>();
    let receiver = ConnectionReceiver::new(args.bind.trim())?;
    thread::spawn(move || {
        if let Err(e) = receiver.receive_loop_with_channel(events_tx) {
            error!("Receiver loop failed: {e}");
        }
    });

    let mut hub = Hub::new(
        Duration::from_secs(args.ping_timeout_secs),
        args.join_failure_rate,
    );
    let quote_ticks = tick(Duration::from_millis(args.tick_ms.max(1)));
    let expiry_checks = tick(EXPIRY_CHECK_INTERVAL);

    loop {
        select! {
            recv(events_rx) -> event => match event {
                Ok(event) => hub.handle(event),
                Err(_) => {
                    error!("Receiver stopped");
                    break;
                }
            },
            recv(quote_ticks) -> _ => hub.tick(),
            recv(expiry_checks) -> _ => hub.expire_idle(),
            recv(shutdown_rx) -> _ => break,
        }
    }

    info!("Hub stopping, closing {} connection(s)...", hub.client_count());
    hub.shutdown();
    Ok(())
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
