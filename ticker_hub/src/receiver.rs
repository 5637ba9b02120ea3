use crate::model::ConnectionId;
use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use ticker_common::{ClientFrame, Result, ServerFrame, SyncError};

/// Connection-level event forwarded to the hub loop.
#[derive(Debug)]
pub enum HubEvent {
    /// A client connected. Frames sent to `outbox` are written to it in order;
    /// dropping every sender closes the connection.
    Connected {
        conn: ConnectionId,
        peer: SocketAddr,
        outbox: Sender<ServerFrame>,
    },
    /// The client invoked a hub method.
    Invoke {
        conn: ConnectionId,
        id: u64,
        method: String,
        args: Vec<Value>,
    },
    /// Keep-alive from the client.
    Ping { conn: ConnectionId },
    /// The connection was closed by either side.
    Disconnected { conn: ConnectionId },
}

/// TCP acceptor for push-channel clients.
///
/// Every accepted connection gets a reader thread, which turns client frames into
/// `HubEvent`s, and a writer thread, which drains the connection's outbox. A client
/// that misbehaves only loses its own connection.
pub struct ConnectionReceiver {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

impl ConnectionReceiver {
    /// Bind a new receiver to the provided `bind_addr` (e.g., `0.0.0.0:8090`).
    pub fn new(bind_addr: &str) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Blocking loop that accepts connections and forwards their events to `tx`.
    /// Returns once the hub loop has gone away.
    pub(crate) fn receive_loop_with_channel(self, tx: Sender<HubEvent>) -> Result<()> {
        info!("Ticker hub is listening on {}", self.socket.local_addr()?);

        let mut next_conn: ConnectionId = 0;
        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => {
                    next_conn += 1;
                    match Self::spawn_connection(next_conn, stream, &tx) {
                        Ok(()) => {}
                        Err(SyncError::ChannelSend(e)) => {
                            error!("Hub loop is gone: {e}");
                            return Err(SyncError::ChannelSend(e));
                        }
                        Err(e) => error!("Failed to set up client #{next_conn}: {e}"),
                    }
                }
                Err(e) => error!("TCP connection error: {e}"),
            }
        }
        Ok(())
    }

    fn spawn_connection(conn: ConnectionId, stream: TcpStream, tx: &Sender<HubEvent>) -> Result<()> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        let (outbox, outbox_rx) = unbounded::<ServerFrame>();

        tx.send(HubEvent::Connected { conn, peer, outbox })
            .map_err(|e| SyncError::ChannelSend(e.to_string()))?;
        info!("Client #{conn} connected from {peer}");

        thread::spawn(move || Self::write_loop(conn, writer, outbox_rx));
        let events = tx.clone();
        thread::spawn(move || {
            Self::read_loop(conn, stream, &events);
            let _ = events.send(HubEvent::Disconnected { conn });
        });
        Ok(())
    }

    fn read_loop(conn: ConnectionId, stream: TcpStream, events: &Sender<HubEvent>) {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    debug!("Read from client #{conn} failed: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<ClientFrame>(&line) {
                Ok(ClientFrame::Invoke { id, method, args }) => HubEvent::Invoke {
                    conn,
                    id,
                    method,
                    args,
                },
                Ok(ClientFrame::Ping) => HubEvent::Ping { conn },
                Err(e) => {
                    warn!("Client #{conn} sent a malformed frame: {e}");
                    continue;
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
    }

    fn write_loop(conn: ConnectionId, mut stream: TcpStream, outbox: Receiver<ServerFrame>) {
        for frame in outbox.iter() {
            let line = match frame.to_line() {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to encode frame for client #{conn}: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.write_all(&line) {
                warn!("Write to client #{conn} failed: {e}");
                break;
            }
        }
        let _ = stream.shutdown(Shutdown::Both);
        debug!("Writer for client #{conn} stopping...");
    }
}
