//! # Error Types
//!
//! Error handling for the connection engine.
//!
//! This module defines all error variants that can occur while driving a
//! connection, from low-level I/O failures to protocol violations by the peer.
//!
//! ## Error Categories
//! - **I/O Errors**: Socket and file system failures
//! - **Wire Errors**: Malformed frames, oversized or negative lengths
//! - **Protocol Errors**: Bytes or frames arriving in a state that does not expect them
//! - **Lifecycle Errors**: Double authentication, banned peers, closed connections
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! Every fatal error is local to the connection that produced it: the registry
//! translates it into exactly one disconnect with a human-readable reason and
//! never lets it propagate to other connections.

use std::io;
use thiserror::Error;

/// Reason strings shared by more than one disconnect path.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Peer closed the stream without a disconnect notice.
    pub const REASON_CONNECTION_CLOSED: &str = "Connection closed";
    /// External heartbeat policy decided the peer is gone.
    pub const REASON_CONNECTION_TIMEOUT: &str = "Connection timed out (no activity)";
    /// The server process is going down.
    pub const REASON_SERVER_SHUTDOWN: &str = "Server is shutting down";
    /// The application event channel is gone; nothing can consume inbound traffic.
    pub const REASON_EVENT_CHANNEL_CLOSED: &str = "Application event channel closed";

    /// A queue or registry lock was poisoned by a panicking thread.
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// Primary error type for all connection-engine operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer sent a frame header the codec cannot accept: a declared length
    /// that is negative, shorter than the tag, or above the absolute message cap.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The peer sent a well-formed frame in a state that does not expect it,
    /// e.g. a split continuation with no split transfer in progress.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Connection closed")]
    ConnectionClosed,

    /// A second authentication attempt on an already-authenticated connection.
    #[error("Connection is already authenticated")]
    AlreadyAuthenticated,

    /// The peer's address is on the ban list; the connection was refused at accept.
    #[error("Address is banned: {0}")]
    Banned(std::net::IpAddr),

    /// The connection cap is reached; the connection was refused at accept.
    #[error("Server is full ({0} connections)")]
    ServerFull(usize),

    /// Application code tried to enqueue a message with a reserved tag.
    #[error("Message tag {0} is reserved by the wire protocol")]
    ReservedTag(i32),

    #[error("Operation timed out")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    LockPoisoned(&'static str),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
