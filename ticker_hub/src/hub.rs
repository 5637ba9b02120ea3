//! Hub state: connected clients, their group memberships and keep-alives.
//!
//! `Hub` is owned by the main loop and driven by `HubEvent`s from the receiver plus
//! two timers: quote ticks and keep-alive checks. Every invocation is answered with a
//! completion carrying the invoke id; a successful join is followed by a snapshot of
//! the joined symbol so the client does not wait for the next tick.
use crate::model::ConnectionId;
use crate::model::groups::GroupRegistry;
use crate::model::ping_monitor::PingMonitor;
use crate::model::quote::QuoteGenerator;
use crate::receiver::HubEvent;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use ticker_common::net::TICKER_UPDATE_EVENT;
use ticker_common::{HubMethod, Result, ServerFrame, Symbol, SyncError, TickerUpdate};

pub struct Hub {
    clients: HashMap<ConnectionId, Sender<ServerFrame>>,
    groups: GroupRegistry,
    quotes: QuoteGenerator,
    pings: PingMonitor,
    join_failure_rate: f64,
}

impl Hub {
    pub fn new(ping_timeout: Duration, join_failure_rate: f64) -> Self {
        Self {
            clients: HashMap::new(),
            groups: GroupRegistry::new(),
            quotes: QuoteGenerator::new(),
            pings: PingMonitor::new(ping_timeout),
            join_failure_rate: join_failure_rate.clamp(0.0, 1.0),
        }
    }

    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { conn, peer, outbox } => {
                debug!("Registering client #{conn} ({peer})");
                self.clients.insert(conn, outbox);
                self.pings.update_ping(conn);
            }
            HubEvent::Invoke {
                conn,
                id,
                method,
                args,
            } => {
                if !self.clients.contains_key(&conn) {
                    return;
                }
                self.pings.update_ping(conn);
                match self.invoke(conn, &method, &args) {
                    Ok(snapshot) => {
                        self.send(conn, ServerFrame::Completion { id, error: None });
                        if let Some(frame) = snapshot {
                            self.send(conn, frame);
                        }
                    }
                    Err(e) => {
                        warn!("Client #{conn} {method} #{id} failed: {e}");
                        self.send(
                            conn,
                            ServerFrame::Completion {
                                id,
                                error: Some(e.to_string()),
                            },
                        );
                    }
                }
            }
            HubEvent::Ping { conn } => {
                if self.clients.contains_key(&conn) {
                    debug!("Received ping from client #{conn}");
                    self.pings.update_ping(conn);
                }
            }
            HubEvent::Disconnected { conn } => self.remove_client(conn, "connection closed"),
        }
    }

    /// Runs one method call. A join returns the snapshot frame to send after the
    /// completion.
    fn invoke(
        &mut self,
        conn: ConnectionId,
        method: &str,
        args: &[Value],
    ) -> Result<Option<ServerFrame>> {
        let method = HubMethod::from_str(method)
            .map_err(|_| SyncError::Format(format!("unknown method {method}")))?;
        let symbol = match args {
            [Value::String(raw)] => Symbol::new(raw)?,
            _ => {
                return Err(SyncError::Format(format!(
                    "{method} expects a single symbol argument"
                )));
            }
        };

        match method {
            HubMethod::JoinTickerGroup => {
                if self.join_failure_rate > 0.0
                    && rand::rng().random_bool(self.join_failure_rate)
                {
                    return Err(SyncError::Format(format!("join {symbol} rejected")));
                }
                if self.groups.join(conn, symbol.clone()) {
                    info!("Client #{conn} joined {symbol}");
                }
                let snapshot = self.quotes.snapshot(&symbol);
                Ok(Some(update_event(&snapshot)?))
            }
            HubMethod::LeaveTickerGroup => {
                if self.groups.leave(conn, &symbol) {
                    info!("Client #{conn} left {symbol}");
                }
                Ok(None)
            }
        }
    }

    /// Moves every symbol with members one tick and pushes the quote to its group.
    pub fn tick(&mut self) {
        for symbol in self.groups.active_symbols() {
            let update = self.quotes.tick(&symbol);
            let frame = match update_event(&update) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to encode quote for {symbol}: {e}");
                    continue;
                }
            };
            for conn in self.groups.members(&symbol) {
                self.send(conn, frame.clone());
            }
        }
    }

    /// Drops clients whose keep-alives stopped.
    pub fn expire_idle(&mut self) {
        for conn in self.pings.check_timeouts() {
            self.remove_client(conn, "ping timeout");
        }
    }

    /// Drops every client, closing their connections.
    pub fn shutdown(&mut self) {
        let conns: Vec<ConnectionId> = self.clients.keys().copied().collect();
        for conn in conns {
            self.remove_client(conn, "hub shutdown");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn send(&mut self, conn: ConnectionId, frame: ServerFrame) {
        let Some(outbox) = self.clients.get(&conn) else {
            return;
        };
        if outbox.send(frame).is_err() {
            self.remove_client(conn, "writer stopped");
        }
    }

    /// Forgets `conn` and all of its memberships. Dropping the outbox makes the
    /// writer close the socket.
    fn remove_client(&mut self, conn: ConnectionId, reason: &str) {
        if self.clients.remove(&conn).is_none() {
            return;
        }
        self.pings.remove(conn);
        let symbols = self.groups.remove_connection(conn);
        info!(
            "Client #{conn} dropped ({reason}), discarded {} membership(s)",
            symbols.len()
        );
    }
}

fn update_event(update: &TickerUpdate) -> Result<ServerFrame> {
    Ok(ServerFrame::Event {
        name: TICKER_UPDATE_EVENT.to_string(),
        payload: serde_json::to_value(update)?,
    })
}
