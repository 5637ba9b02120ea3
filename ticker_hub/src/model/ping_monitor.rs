//! Keep-alive state tracker for hub connections.
//!
//! Records the last time each connection sent anything (a ping or an invocation)
//! and reports the connections that have been silent for longer than the timeout.
//!
//! - `PingMonitor::update_ping(conn)`: record fresh activity for a connection.
//! - `PingMonitor::check_timeouts()`: return and forget the connections past the
//!   timeout.
//! - `PingMonitor::remove(conn)`: stop tracking a connection that closed on its own.
//!
//! Time is measured with `std::time::Instant`, which is monotonic. The monitor is not
//! synchronized; the hub loop owns it.

use super::ConnectionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks client keep-alive pings and determines inactivity based on a timeout.
pub struct PingMonitor {
    /// Last activity per tracked connection.
    clients: HashMap<ConnectionId, Instant>,
    /// Threshold after which a client is considered timed out.
    timeout: Duration,
}

impl PingMonitor {
    /// Create a new instance of PingMonitor
    pub fn new(timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            timeout,
        }
    }

    /// Record activity from `conn`, starting to track it if needed.
    pub fn update_ping(&mut self, conn: ConnectionId) {
        self.clients.insert(conn, Instant::now());
    }

    /// Returns the connections silent for longer than the timeout and stops tracking
    /// them, so each timeout is reported once.
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let now = Instant::now();
        let timeout = self.timeout;
        let mut timed_out = Vec::new();

        self.clients.retain(|conn, last_ping| {
            if now.duration_since(*last_ping) > timeout {
                timed_out.push(*conn);
                false
            } else {
                true
            }
        });
        timed_out
    }

    /// Stop tracking `conn`.
    pub fn remove(&mut self, conn: ConnectionId) {
        self.clients.remove(&conn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn silent_connection_times_out_once() {
        let mut monitor = PingMonitor::new(Duration::from_millis(10));
        monitor.update_ping(1);
        thread::sleep(Duration::from_millis(30));

        assert_eq!(monitor.check_timeouts(), vec![1]);
        assert!(monitor.check_timeouts().is_empty());
    }

    #[test]
    fn fresh_ping_keeps_connection_alive() {
        let mut monitor = PingMonitor::new(Duration::from_secs(60));
        monitor.update_ping(1);
        monitor.update_ping(2);
        monitor.remove(2);

        assert!(monitor.check_timeouts().is_empty());
        assert_eq!(monitor.clients.len(), 1);
    }
}
