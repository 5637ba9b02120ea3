//!
//! Common types and utilities shared by the ticker hub and the ticker client.
//!
//! This crate aggregates:
//! - `error`: unified error type `SyncError` used across the workspace.
//! - `result`: handy `Result<T, SyncError>` alias.
//! - `tickers`: canonical symbols, ticker snapshots and universe file parsing.
//! - `protocol`: newline-delimited JSON frames exchanged over the push channel.
//! - `net`: networking constants, remote method and event names.
#![warn(missing_docs)]
pub mod error;
pub mod net;
pub mod protocol;
pub mod result;
pub mod tickers;

pub use error::SyncError;
pub use protocol::{ClientFrame, HubMethod, ServerFrame};
pub use result::Result;
pub use tickers::{Symbol, Ticker, TickerUpdate};
