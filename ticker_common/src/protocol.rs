//! Push-channel protocol shared by client and hub.
//!
//! Frames are JSON objects tagged by `type`, one per line. The client sends
//! `invoke` frames (a remote method call with positional arguments) and `ping`
//! keep-alives; the hub answers every invoke with a `completion` carrying the same
//! id and pushes named `event` frames to group members.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use crate::error::SyncError;
use crate::tickers::Symbol;

/// Remote methods understood by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum HubMethod {
    /// Add the calling connection to a symbol's update group.
    JoinTickerGroup,
    /// Remove the calling connection from a symbol's update group.
    LeaveTickerGroup,
}

/// Frame sent from the client to the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Remote method invocation.
    Invoke {
        /// Correlates the hub's completion with this call.
        id: u64,
        /// Method name, e.g. `JoinTickerGroup`.
        method: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// Keep-alive.
    Ping,
}

impl ClientFrame {
    /// Builds an invocation of `method` for a single symbol argument.
    pub fn invoke(id: u64, method: HubMethod, symbol: &Symbol) -> Self {
        ClientFrame::Invoke {
            id,
            method: method.to_string(),
            args: vec![Value::String(symbol.to_string())],
        }
    }

    /// Encode the frame as a JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, SyncError> {
        encode_line(self)
    }
}

/// Frame sent from the hub to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Outcome of an earlier invoke with the same id. `error` is `None` on success.
    Completion {
        #[allow(missing_docs)]
        id: u64,
        #[allow(missing_docs)]
        #[serde(default)]
        error: Option<String>,
    },
    /// Server-initiated event.
    Event {
        /// Event name, e.g. `ReceiveTickerUpdate`.
        name: String,
        /// Event body.
        payload: Value,
    },
}

impl ServerFrame {
    /// Encode the frame as a JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, SyncError> {
        encode_line(self)
    }
}

fn encode_line<T: Serialize>(frame: &T) -> Result<Vec<u8>, SyncError> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(line)
}
