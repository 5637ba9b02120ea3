//! Domain models and utilities for the ticker hub.
//!
//! - `groups`: symbol group memberships per connection.
//! - `ping_monitor`: in-memory keep-alive tracker for client timeouts.
//! - `quote`: synthetic quote state and the random-walk generator.

pub mod groups;
pub mod ping_monitor;
pub mod quote;

/// Hub-assigned identifier of one accepted connection.
pub type ConnectionId = u64;
