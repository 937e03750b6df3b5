//! # Transport Layer
//!
//! Socket ownership and lifecycle: the per-connection object and its two I/O
//! tasks, the registry that owns all live connections, and the accept loop.

pub mod connection;
pub mod registry;
pub mod server;
