//! Ticker Client: keeps a filtered ticker list live over a hub push channel.
//!
//! The client holds a base list of tickers fetched from a [`source::TickerSource`],
//! joins one hub group per distinct symbol in that list, and merges pushed ticker
//! updates into the held rows. The pieces, bottom-up:
//!
//! - `config`: session settings and reconnect backoff.
//! - `session`: the TCP push-channel link with reconnects and connection epochs.
//! - `symbol_set`: canonical symbol sets and change detection.
//! - `reconciler`: the group-membership state machine.
//! - `merger`: last-write-wins update merging.
//! - `teardown`: leaving every group when the view goes away.
//! - `source`: filters and the base list.
//! - `feed`: the single-threaded owner that wires everything together.
pub mod config;
pub mod feed;
pub mod merger;
pub mod reconciler;
pub mod session;
pub mod source;
pub mod symbol_set;
pub mod teardown;

#[cfg(test)]
mod testing;
