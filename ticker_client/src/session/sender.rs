//! Keep-alive pings for a live hub connection.
//!
//! One ping thread runs per connection epoch. It stops on its own once that epoch
//! is left or the session shuts down, so a reconnect never ends up with two
//! threads pinging the same link.
use super::Shared;
use log::{debug, error, info};
use std::sync::Arc;
use std::thread;
use ticker_common::{ClientFrame, Result, SyncError};

/// Helper type for writing keep-alive frames to the hub.
pub(super) struct FrameSender;

impl FrameSender {
    pub(super) fn start_ping_thread(shared: Arc<Shared>, epoch: u64) {
        let interval = shared.config.ping_interval;
        info!("Ping thread started for epoch {epoch}, interval {interval:?}");
        let spawned = thread::Builder::new()
            .name("ticker-ping".into())
            .spawn(move || {
                loop {
                    thread::sleep(interval);
                    if shared.is_shutdown() {
                        break;
                    }
                    match Self::send_ping(&shared, epoch) {
                        Ok(()) => debug!("PING sent (epoch {epoch})"),
                        Err(SyncError::NotConnected | SyncError::StaleEpoch { .. }) => break,
                        Err(e) => {
                            error!("PING THREAD ERROR: Failed to send PING: {e}");
                            break;
                        }
                    }
                }
                debug!("Ping thread for epoch {epoch} stopping...");
            });
        if let Err(e) = spawned {
            error!("Failed to spawn ping thread: {e}");
        }
    }

    fn send_ping(shared: &Shared, epoch: u64) -> Result<()> {
        let mut link = shared.lock_link();
        link.check(epoch)?;
        let line = ClientFrame::Ping.to_line()?;
        link.write_line(&line)
    }
}
