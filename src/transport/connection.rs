//! One live TCP peer: identity, lifecycle, and the two I/O tasks.

use crate::core::codec::FrameCodec;
use crate::core::frame::FrameLimits;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::reassembly::Reassembler;
use crate::protocol::scheduler::OutboundScheduler;
use crate::transport::registry::Registry;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};
use uuid::Uuid;

/// Stable identifier for a connection, assigned at accept and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity fields, mutable only until authentication.
#[derive(Debug)]
struct Identity {
    player_name: String,
    guid: Option<Uuid>,
    authenticated: bool,
}

/// Teardown progress. Transitions only move forward and only once:
/// `Active → Closing → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Closing,
    Closed,
}

/// One live TCP peer.
///
/// Owned exclusively by the [`Registry`] for its lifetime; the application
/// layer only ever holds a shared handle. The socket's read and write halves
/// are owned by the two per-connection tasks and released exactly once when
/// those tasks exit.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    endpoint: String,
    identity: Mutex<Identity>,
    scheduler: OutboundScheduler,
    // Guards only the has-teardown-begun decision; never held across I/O.
    lifecycle: Mutex<Lifecycle>,
    shutdown: watch::Sender<bool>,
    last_recv: Mutex<Instant>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, peer: SocketAddr, max_frame_payload: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id,
            peer,
            endpoint: peer.to_string(),
            identity: Mutex::new(Identity {
                player_name: String::from("Unknown"),
                guid: None,
                authenticated: false,
            }),
            scheduler: OutboundScheduler::new(max_frame_payload),
            lifecycle: Mutex::new(Lifecycle::Active),
            shutdown,
            last_recv: Mutex::new(Instant::now()),
        }
    }

    /// Registry-assigned identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote socket address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Remote endpoint as a display string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Player name; "Unknown" until authenticated.
    pub fn player_name(&self) -> String {
        match self.identity.lock() {
            Ok(identity) => identity.player_name.clone(),
            Err(poisoned) => poisoned.into_inner().player_name.clone(),
        }
    }

    /// Player GUID; empty until authentication succeeds, then immutable.
    pub fn guid(&self) -> Option<Uuid> {
        match self.identity.lock() {
            Ok(identity) => identity.guid,
            Err(poisoned) => poisoned.into_inner().guid,
        }
    }

    /// Whether authentication has completed on this connection.
    pub fn is_authenticated(&self) -> bool {
        match self.identity.lock() {
            Ok(identity) => identity.authenticated,
            Err(poisoned) => poisoned.into_inner().authenticated,
        }
    }

    /// Assign identity exactly once. A second attempt fails with
    /// [`AlreadyAuthenticated`](crate::error::ProtocolError::AlreadyAuthenticated).
    pub(crate) fn authenticate(&self, player_name: &str, guid: Uuid) -> Result<()> {
        let mut identity = self
            .identity
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED))?;
        if identity.authenticated {
            return Err(ProtocolError::AlreadyAuthenticated);
        }
        identity.player_name = player_name.to_string();
        identity.guid = Some(guid);
        identity.authenticated = true;
        Ok(())
    }

    /// The outbound scheduler for this connection.
    pub fn scheduler(&self) -> &OutboundScheduler {
        &self.scheduler
    }

    /// Decide teardown at most once. Returns `true` for the caller that wins
    /// the race; every later caller gets `false` and must do nothing.
    pub(crate) fn begin_teardown(&self) -> bool {
        let mut lifecycle = match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *lifecycle != Lifecycle::Active {
            return false;
        }
        *lifecycle = Lifecycle::Closing;
        true
    }

    pub(crate) fn mark_closed(&self) {
        let mut lifecycle = match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *lifecycle = Lifecycle::Closed;
    }

    /// Whether teardown has started (or finished).
    pub fn is_closing(&self) -> bool {
        let lifecycle = match self.lifecycle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *lifecycle != Lifecycle::Active
    }

    /// Tell both I/O tasks to stop.
    pub(crate) fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn touch_recv(&self) {
        if let Ok(mut last) = self.last_recv.lock() {
            *last = Instant::now();
        }
    }

    /// Time since the last complete inbound message, for the external
    /// heartbeat/timeout policy.
    pub fn last_recv_elapsed(&self) -> Duration {
        match self.last_recv.lock() {
            Ok(last) => last.elapsed(),
            Err(poisoned) => poisoned.into_inner().elapsed(),
        }
    }

    /// Time since the last completed outbound write.
    pub fn last_send_elapsed(&self) -> Duration {
        self.scheduler
            .last_send_elapsed()
            .unwrap_or(Duration::ZERO)
    }
}

/// Read task: drive the reassembler over the socket until teardown, EOF, or a
/// protocol error, routing each outcome through the registry's idempotent
/// disconnect.
pub(crate) async fn read_loop(
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    read_half: OwnedReadHalf,
    limits: FrameLimits,
) {
    let mut framed = FramedRead::new(read_half, Reassembler::new(limits));
    let mut shutdown = connection.shutdown_signal();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            inbound = framed.next() => match inbound {
                Some(Ok(message)) => {
                    connection.touch_recv();
                    if registry.dispatch_message(&connection, message).await.is_err() {
                        registry
                            .disconnect(&connection, constants::REASON_EVENT_CHANNEL_CLOSED)
                            .await;
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(connection = %connection.id(), peer = %connection.endpoint(), error = %e, "Inbound stream error");
                    registry.disconnect(&connection, &e.to_string()).await;
                    break;
                }
                None => {
                    debug!(connection = %connection.id(), peer = %connection.endpoint(), "Peer closed the stream");
                    registry
                        .disconnect(&connection, constants::REASON_CONNECTION_CLOSED)
                        .await;
                    break;
                }
            }
        }
    }
    // Dropping the framed reader releases the read half; partially
    // assembled inbound buffers go with it.
}

/// Write task: drain the scheduler one frame at a time, keeping exactly one
/// physical write outstanding.
pub(crate) async fn write_loop(
    registry: Arc<Registry>,
    connection: Arc<Connection>,
    write_half: OwnedWriteHalf,
) {
    let mut sink = FramedWrite::new(write_half, FrameCodec);
    let mut shutdown = connection.shutdown_signal();

    'outer: loop {
        loop {
            let frame = match connection.scheduler().begin_send() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    registry.disconnect(&connection, &e.to_string()).await;
                    break 'outer;
                }
            };

            if let Err(e) = sink.send(frame).await {
                warn!(connection = %connection.id(), peer = %connection.endpoint(), error = %e, "Send failure");
                registry
                    .disconnect(&connection, &format!("Send failure: {e}"))
                    .await;
                break 'outer;
            }

            if connection.scheduler().complete_send().is_err() {
                break 'outer;
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = connection.scheduler().wait_writable() => {}
        }
    }
    // Dropping the sink releases the write half and closes the stream.
}
