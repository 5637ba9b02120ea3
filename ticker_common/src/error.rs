//! Error types shared between hub and client.
//!
//! The `SyncError` enum unifies common failure cases for I/O, serialization,
//! channel communication and push-channel invocations, allowing
//! crates to propagate a single error type.
use std::io;

use thiserror::Error;

/// Unified error type shared by hub and client.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Error while parsing the ticker universe file into `Ticker` values.
    #[error("Parse tickers file error: {0}")]
    ParseTickersFile(String),

    /// A symbol was empty or contained separator characters.
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// The push channel has no live connection.
    #[error("Push channel is not connected")]
    NotConnected,

    /// An invocation was addressed to a connection epoch that no longer exists.
    #[error("Stale connection epoch {requested} (current {current})")]
    StaleEpoch {
        /// Epoch the caller believed to be current.
        requested: u64,
        /// Epoch the session is actually in.
        current: u64,
    },
}
