//! Push-channel connection lifecycle.
//!
//! `ConnectionSession` owns a single TCP link to the hub and hides reconnects from
//! its users. It exposes the three push-channel primitives the rest of the client
//! relies on:
//!
//! - `is_connected()` / `epoch()`: the live connection state. Every successful
//!   connect starts a new epoch; a drop flips the state to `Disconnected` under the
//!   link lock *before* any notification is sent, so nothing can be written to a
//!   link that is already known to be dead.
//! - `invoke(epoch, method, symbol)`: writes an invoke frame and returns without
//!   waiting for the hub. The outcome arrives later as `SessionEvent::Completed`
//!   tagged with the epoch it was issued in. The session never retries.
//! - `on(event, handler)`: registers a handler for named server events and
//!   returns a `Subscription` guard; dropping the guard unsubscribes.
//!
//! Threads: one supervisor thread connects, reads frames and reconnects with the
//! configured backoff; one ping thread per epoch sends keep-alives.
mod sender;

use crate::config::SessionConfig;
use crate::session::sender::FrameSender;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use strum_macros::Display;
use ticker_common::{ClientFrame, HubMethod, Result, ServerFrame, Symbol, SyncError};

/// Lifecycle state of the push-channel link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outcome of an earlier invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Epoch the invocation was issued in.
    pub epoch: u64,
    pub method: HubMethod,
    pub symbol: Symbol,
    /// `Err` carries the hub's error text.
    pub outcome: std::result::Result<(), String>,
}

/// Notifications emitted by the session, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The link changed state. For `Connected` this is the new epoch, otherwise the
    /// epoch that was just left (or last attempted).
    StateChanged { state: ConnectionState, epoch: u64 },
    Completed(Completion),
}

/// Invocation side of a push channel, as seen by the membership reconciler.
pub trait PushChannel {
    /// Whether the link is currently `Connected`.
    fn is_connected(&self) -> bool;

    /// Current connection epoch.
    fn epoch(&self) -> u64;

    /// Dispatches `method(symbol)` on the connection identified by `epoch`.
    ///
    /// Returns once the call is on the wire; the outcome is reported later as a
    /// [`Completion`]. Fails immediately with `NotConnected` or `StaleEpoch` when
    /// that connection is gone.
    fn invoke(&self, epoch: u64, method: HubMethod, symbol: &Symbol) -> Result<()>;
}

impl<T: PushChannel + ?Sized> PushChannel for Arc<T> {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn epoch(&self) -> u64 {
        (**self).epoch()
    }

    fn invoke(&self, epoch: u64, method: HubMethod, symbol: &Symbol) -> Result<()> {
        (**self).invoke(epoch, method, symbol)
    }
}

impl<T: PushChannel + ?Sized> PushChannel for &T {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn epoch(&self) -> u64 {
        (**self).epoch()
    }

    fn invoke(&self, epoch: u64, method: HubMethod, symbol: &Symbol) -> Result<()> {
        (**self).invoke(epoch, method, symbol)
    }
}

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

/// Registration returned by [`ConnectionSession::on`]. Dropping it unsubscribes.
#[must_use = "dropping the subscription unregisters the handler"]
pub struct Subscription {
    id: u64,
    event: String,
    registry: Weak<Mutex<HandlerRegistry>>,
}

impl Subscription {
    /// Unregisters the handler now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handlers) = registry.handlers.get_mut(&self.event) {
            handlers.retain(|(id, _)| *id != self.id);
            if handlers.is_empty() {
                registry.handlers.remove(&self.event);
            }
        }
        debug!("Handler #{} for {} unsubscribed", self.id, self.event);
    }
}

struct PendingInvocation {
    method: HubMethod,
    symbol: Symbol,
}

/// Mutable link state; always accessed under `Shared::link`.
struct Link {
    state: ConnectionState,
    epoch: u64,
    stream: Option<TcpStream>,
    next_id: u64,
    pending: HashMap<u64, PendingInvocation>,
}

impl Link {
    fn check(&self, epoch: u64) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(SyncError::NotConnected);
        }
        if self.epoch != epoch {
            return Err(SyncError::StaleEpoch {
                requested: epoch,
                current: self.epoch,
            });
        }
        Ok(())
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SyncError::NotConnected);
        };
        if let Err(e) = stream.write_all(line) {
            // Unblocks the reader, which then reports the drop.
            let _ = stream.shutdown(Shutdown::Both);
            return Err(SyncError::Io(e));
        }
        Ok(())
    }
}

struct Shared {
    config: SessionConfig,
    link: Mutex<Link>,
    handlers: Arc<Mutex<HandlerRegistry>>,
    events: Sender<SessionEvent>,
    shutdown: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn notify(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Session event dropped: receiver is gone");
        }
    }

    fn set_connecting(&self) {
        let epoch = {
            let mut link = self.lock_link();
            if link.state == ConnectionState::Connecting {
                return;
            }
            link.state = ConnectionState::Connecting;
            link.epoch
        };
        self.notify(SessionEvent::StateChanged {
            state: ConnectionState::Connecting,
            epoch,
        });
    }

    /// Installs a fresh stream and starts a new epoch. Returns `None` if the session
    /// was shut down while the connect attempt was in progress.
    fn mark_connected(&self, stream: TcpStream) -> Option<u64> {
        let epoch = {
            let mut link = self.lock_link();
            if self.is_shutdown() {
                let _ = stream.shutdown(Shutdown::Both);
                return None;
            }
            link.epoch += 1;
            link.state = ConnectionState::Connected;
            link.stream = Some(stream);
            link.pending.clear();
            link.epoch
        };
        self.notify(SessionEvent::StateChanged {
            state: ConnectionState::Connected,
            epoch,
        });
        Some(epoch)
    }

    /// Moves `epoch` to `Disconnected`. Returns `false` if that epoch was already
    /// left, so each drop is reported once.
    fn mark_disconnected(&self, epoch: u64) -> bool {
        {
            let mut link = self.lock_link();
            if link.epoch != epoch || link.state == ConnectionState::Disconnected {
                return false;
            }
            link.state = ConnectionState::Disconnected;
            if let Some(stream) = link.stream.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            link.pending.clear();
        }
        self.notify(SessionEvent::StateChanged {
            state: ConnectionState::Disconnected,
            epoch,
        });
        true
    }

    fn current_epoch(&self) -> u64 {
        self.lock_link().epoch
    }

    fn open_stream(&self) -> Result<TcpStream> {
        let mut last_error = None;
        for addr in self.config.hub_addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => SyncError::Io(e),
            None => SyncError::Format(format!(
                "{} resolved to no addresses",
                self.config.hub_addr
            )),
        })
    }

    fn dispatch(&self, epoch: u64, frame: ServerFrame) {
        match frame {
            ServerFrame::Completion { id, error } => {
                let pending = {
                    let mut link = self.lock_link();
                    if link.epoch == epoch {
                        link.pending.remove(&id)
                    } else {
                        None
                    }
                };
                match pending {
                    Some(call) => self.notify(SessionEvent::Completed(Completion {
                        epoch,
                        method: call.method,
                        symbol: call.symbol,
                        outcome: error.map_or(Ok(()), Err),
                    })),
                    None => debug!("Completion #{id} matches no pending invocation"),
                }
            }
            ServerFrame::Event { name, payload } => {
                let handlers: Vec<Handler> = {
                    let registry = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
                    registry
                        .handlers
                        .get(&name)
                        .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                        .unwrap_or_default()
                };
                if handlers.is_empty() {
                    debug!("No handler registered for event {name}");
                }
                for handler in handlers {
                    handler(&payload);
                }
            }
        }
    }

    fn read_loop(&self, stream: TcpStream, epoch: u64) {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    if !self.is_shutdown() {
                        warn!("Read from hub failed: {e}");
                    }
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ServerFrame>(&line) {
                Ok(frame) => self.dispatch(epoch, frame),
                Err(e) => warn!("Dropping malformed frame from hub: {e}"),
            }
        }
    }

    fn supervise(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        while !self.is_shutdown() {
            self.set_connecting();
            match self.open_stream().and_then(|s| Ok((s.try_clone()?, s))) {
                Ok((reader, writer)) => {
                    attempt = 0;
                    let Some(epoch) = self.mark_connected(writer) else {
                        break;
                    };
                    info!("Connected to hub {} (epoch {epoch})", self.config.hub_addr);
                    FrameSender::start_ping_thread(Arc::clone(&self), epoch);
                    self.read_loop(reader, epoch);
                    if self.mark_disconnected(epoch) {
                        warn!("Connection to hub lost (epoch {epoch})");
                    }
                }
                Err(e) => {
                    warn!("Connect to {} failed: {e}", self.config.hub_addr);
                    self.mark_disconnected(self.current_epoch());
                }
            }
            if self.is_shutdown() {
                break;
            }
            let delay = self.config.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!("Reconnecting in {delay:?}");
            thread::sleep(delay);
        }
        self.running.store(false, Ordering::SeqCst);
        debug!("Session supervisor stopping...");
    }
}

/// Push-channel client with automatic reconnect.
pub struct ConnectionSession {
    shared: Arc<Shared>,
}

impl ConnectionSession {
    /// Creates a disconnected session and the receiver for its events.
    pub fn new(config: SessionConfig) -> (Self, Receiver<SessionEvent>) {
        let (events, events_rx) = unbounded();
        let shared = Arc::new(Shared {
            config,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                epoch: 0,
                stream: None,
                next_id: 1,
                pending: HashMap::new(),
            }),
            handlers: Arc::new(Mutex::new(HandlerRegistry::default())),
            events,
            shutdown: AtomicBool::new(false),
            running: AtomicBool::new(false),
        });
        (Self { shared }, events_rx)
    }

    /// Starts the supervisor thread, which connects and keeps reconnecting until
    /// [`Self::disconnect`]. Calling it again while it runs is a no-op.
    pub fn connect(&self) -> Result<()> {
        if self.shared.is_shutdown() {
            return Err(SyncError::Format("session was disconnected".into()));
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("ticker-session".into())
            .spawn(move || shared.supervise())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                SyncError::Io(e)
            })?;
        Ok(())
    }

    /// Closes the link and stops reconnecting. A disconnected session cannot be
    /// connected again.
    pub fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if self.shared.mark_disconnected(self.shared.current_epoch()) {
            info!("Disconnected from hub {}", self.shared.config.hub_addr);
        }
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock_link().state
    }

    /// Registers `handler` for server events named `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut registry = self
            .shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            id,
            event: event.to_string(),
            registry: Arc::downgrade(&self.shared.handlers),
        }
    }
}

impl PushChannel for ConnectionSession {
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn epoch(&self) -> u64 {
        self.shared.current_epoch()
    }

    fn invoke(&self, epoch: u64, method: HubMethod, symbol: &Symbol) -> Result<()> {
        let mut link = self.shared.lock_link();
        link.check(epoch)?;
        let id = link.next_id;
        link.next_id += 1;
        let line = ClientFrame::invoke(id, method, symbol).to_line()?;
        link.write_line(&line)?;
        link.pending.insert(
            id,
            PendingInvocation {
                method,
                symbol: symbol.clone(),
            },
        );
        debug!("Invoked #{id} {method}({symbol}) on epoch {epoch}");
        Ok(())
    }
}
