//! # Connection Registry
//!
//! Owns the set of live connections, routes completed inbound messages to the
//! application layer, and funnels every disconnect trigger (peer close,
//! protocol violation, application request, ban enforcement) into one
//! idempotent teardown path.
//!
//! The registry and its connections are constructed objects passed to
//! whatever owns the accept loop; there is no process-wide singleton.

use crate::config::NetworkConfig;
use crate::core::frame::FrameLimits;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Lane, Message};
use crate::transport::connection::{read_loop, write_loop, Connection, ConnectionId};
use crate::utils::timeout;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Injected ban check, consulted once per accept. Ownership and persistence
/// of the ban list live outside the engine.
pub type BanPredicate = Arc<dyn Fn(IpAddr) -> bool + Send + Sync>;

/// Everything the engine reports to the application layer.
#[derive(Debug)]
pub enum Event {
    /// A connection was accepted and its I/O tasks are running.
    Connected(Arc<Connection>),
    /// A complete logical message arrived (split transfers already reassembled).
    Message {
        connection: Arc<Connection>,
        message: Message,
    },
    /// Teardown finished. Emitted exactly once per connection.
    Closed {
        connection: Arc<Connection>,
        reason: String,
    },
}

/// Owner of all live connections.
pub struct Registry {
    connections: RwLock<HashMap<u64, Arc<Connection>>>,
    events: mpsc::Sender<Event>,
    is_banned: BanPredicate,
    config: NetworkConfig,
    next_id: AtomicU64,
}

impl Registry {
    /// Build a registry and the event stream the application consumes.
    ///
    /// The channel capacity is `server.backpressure_limit`: a slow consumer
    /// stalls only the read task of the connection trying to dispatch.
    pub fn new(config: NetworkConfig, is_banned: BanPredicate) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (events, event_rx) = mpsc::channel(config.server.backpressure_limit);
        let registry = Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
            events,
            is_banned,
            config,
            next_id: AtomicU64::new(1),
        });
        (registry, event_rx)
    }

    /// Construct a connection for an accepted socket and start its I/O tasks.
    ///
    /// Fails immediately, before any state is created, if the peer address
    /// is banned or the connection cap is reached.
    #[instrument(skip(self, stream), level = "debug")]
    pub async fn accept(self: &Arc<Self>, stream: TcpStream) -> Result<Arc<Connection>> {
        let peer = stream.peer_addr()?;

        if (self.is_banned)(peer.ip()) {
            info!(peer = %peer, "Refusing banned address");
            return Err(ProtocolError::Banned(peer.ip()));
        }

        let live = self.len()?;
        if live >= self.config.server.max_connections {
            warn!(peer = %peer, connections = live, "Refusing connection, server full");
            return Err(ProtocolError::ServerFull(live));
        }

        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Arc::new(Connection::new(
            id,
            peer,
            self.config.protocol.max_frame_payload,
        ));

        {
            let mut connections = self
                .connections
                .write()
                .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED))?;
            connections.insert(id.0, connection.clone());
        }

        info!(connection = %id, peer = %peer, "Connection accepted");
        // Connected must reach the application before the read task can race
        // an inbound message (or a teardown) onto the event channel.
        if self
            .events
            .send(Event::Connected(connection.clone()))
            .await
            .is_err()
        {
            // Nobody is listening; tear the connection straight back down.
            self.disconnect(&connection, constants::REASON_EVENT_CHANNEL_CLOSED)
                .await;
            return Err(ProtocolError::ConnectionClosed);
        }

        let (read_half, write_half) = stream.into_split();
        let limits = FrameLimits::from(&self.config.protocol);
        tokio::spawn(read_loop(
            self.clone(),
            connection.clone(),
            read_half,
            limits,
        ));
        tokio::spawn(write_loop(self.clone(), connection.clone(), write_half));

        Ok(connection)
    }

    /// Assign identity to a connection exactly once.
    pub fn authenticate(&self, connection: &Connection, player_name: &str, guid: Uuid) -> Result<()> {
        connection.authenticate(player_name, guid)?;
        info!(
            connection = %connection.id(),
            player = player_name,
            %guid,
            "Connection authenticated"
        );
        Ok(())
    }

    /// Enqueue a message on one connection's scheduler.
    ///
    /// Thin pass-through so the application layer never touches socket or
    /// queue internals.
    pub fn send(&self, connection: &Connection, message: Message, lane: Lane) -> Result<()> {
        connection.scheduler().enqueue(message, lane)
    }

    /// Enqueue a message to every authenticated connection. Returns how many
    /// peers it was queued for.
    pub fn broadcast(&self, message: &Message, lane: Lane) -> Result<usize> {
        let targets = self.snapshot()?;
        let mut queued = 0;
        for connection in targets {
            if !connection.is_authenticated() {
                continue;
            }
            if connection.scheduler().enqueue(message.clone(), lane).is_ok() {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// The single idempotent teardown entry point.
    ///
    /// Safe to call from any task and from any trigger; the second and later
    /// calls for the same connection are no-ops. Exactly one
    /// [`Event::Closed`] is emitted, carrying the winning caller's reason.
    pub async fn disconnect(&self, connection: &Arc<Connection>, reason: &str) {
        if !connection.begin_teardown() {
            return;
        }

        let dropped = connection.scheduler().shutdown();
        connection.signal_shutdown();

        {
            // Teardown must finish even if another thread panicked in the map.
            let mut connections = match self.connections.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            connections.remove(&connection.id().0);
        }

        connection.mark_closed();
        info!(
            connection = %connection.id(),
            peer = %connection.endpoint(),
            player = %connection.player_name(),
            dropped_messages = dropped,
            reason,
            "Connection closed"
        );

        let _ = self
            .events
            .send(Event::Closed {
                connection: connection.clone(),
                reason: reason.to_string(),
            })
            .await;
    }

    /// Graceful disconnect: enqueue a High-priority notice, give it
    /// `flush_timeout` to reach the wire, then tear down.
    ///
    /// The peer sees the reason before the stream closes unless the flush
    /// window expires first.
    pub async fn disconnect_with_notice(
        &self,
        connection: &Arc<Connection>,
        notice: Message,
        reason: &str,
    ) {
        if connection.is_closing() {
            return;
        }

        if connection.scheduler().enqueue(notice, Lane::High).is_ok() {
            let drained = timeout::with_timeout_error(
                async {
                    loop {
                        match connection.scheduler().is_drained() {
                            Ok(true) | Err(_) => return Ok(()),
                            Ok(false) => tokio::time::sleep(Duration::from_millis(25)).await,
                        }
                    }
                },
                self.config.server.flush_timeout,
            )
            .await;
            if drained.is_err() {
                debug!(connection = %connection.id(), "Flush window expired before notice was sent");
            }
        }

        self.disconnect(connection, reason).await;
    }

    /// Deliver a reassembled inbound message to the application layer.
    pub(crate) async fn dispatch_message(
        &self,
        connection: &Arc<Connection>,
        message: Message,
    ) -> Result<()> {
        self.events
            .send(Event::Message {
                connection: connection.clone(),
                message,
            })
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Look up a live connection by identifier.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .ok()
            .and_then(|connections| connections.get(&id.0).cloned())
    }

    /// Number of live connections.
    pub fn len(&self) -> Result<usize> {
        Ok(self
            .connections
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED))?
            .len())
    }

    /// Whether any connections are live.
    pub fn is_empty(&self) -> bool {
        self.len().map(|n| n == 0).unwrap_or(true)
    }

    /// Snapshot of all live connections, for iteration without holding the map lock.
    pub fn snapshot(&self) -> Result<Vec<Arc<Connection>>> {
        Ok(self
            .connections
            .read()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED))?
            .values()
            .cloned()
            .collect())
    }

    /// Disconnect every live connection with the same reason.
    pub async fn disconnect_all(&self, reason: &str) {
        let targets = self.snapshot().unwrap_or_default();
        for connection in targets {
            self.disconnect(&connection, reason).await;
        }
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}
