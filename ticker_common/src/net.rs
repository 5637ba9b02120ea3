//! Shared networking constants and helpers used by hub and client.

/// TCP port the hub accepts push-channel connections on.
pub const HUB_PORT: u16 = 8090;

/// Event name carrying a ticker snapshot from the hub.
pub const TICKER_UPDATE_EVENT: &str = "ReceiveTickerUpdate";

/// Helper to format an IPv4 address with a port like "ip:port".
pub fn addr(ip: &str, port: u16) -> String {
    format!("{}:{}", ip, port)
}
