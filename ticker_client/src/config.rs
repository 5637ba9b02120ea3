//! Session configuration: hub address, timeouts and reconnect backoff.
use rand::Rng;
use std::time::Duration;
use ticker_common::net::{HUB_PORT, addr};

/// Exponential reconnect backoff with proportional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Upper bound for any single delay, before jitter.
    pub max: Duration,
    /// Growth factor per consecutive failed attempt.
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed (0.0 disables jitter).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl BackoffConfig {
    /// Delay to wait before reconnect attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let raw = self.base.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max.as_secs_f64());
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Duration::from_secs_f64(capped);
        }
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        Duration::from_secs_f64(capped * factor)
    }
}

/// Connection settings for [`crate::session::ConnectionSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Hub address as `host:port`.
    pub hub_addr: String,
    /// Timeout for a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// Interval between keep-alive pings on a live connection.
    pub ping_interval: Duration,
    /// Reconnect policy.
    pub backoff: BackoffConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hub_addr: addr("127.0.0.1", HUB_PORT),
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_millis(2000),
            backoff: BackoffConfig::default(),
        }
    }
}
