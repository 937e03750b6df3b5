//! # relay-core
//!
//! Per-connection network engine for multiplayer game servers.
//!
//! The engine accepts TCP connections, frames and reassembles a custom binary
//! message protocol (including transparent splitting of messages larger than
//! a frame), schedules outbound traffic across three priority lanes, and
//! drives each connection through an authentication/ban/disconnect lifecycle.
//! Payload semantics stay with the application layer: the engine routes
//! opaque byte buffers by an integer tag and nothing more.
//!
//! ## Components
//! - [`core`]: Binary wire format: frame header, splitting, encoder
//! - [`protocol`]: Messages, inbound reassembly, the priority-lane scheduler
//! - [`transport`]: Connections, the registry, and the accept loop
//! - [`config`]: TOML/env configuration with validation
//!
//! ## Usage
//! ```no_run
//! use relay_core::config::NetworkConfig;
//! use relay_core::transport::registry::Registry;
//! use relay_core::transport::server;
//! use relay_core::{Event, Lane, Message};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> relay_core::Result<()> {
//!     let config = NetworkConfig::default();
//!     config.validate_strict()?;
//!
//!     let (registry, mut events) = Registry::new(config, Arc::new(|_addr| false));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:6702").await?;
//!     tokio::spawn(server::serve(listener, registry.clone()));
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             Event::Message { connection, message } => {
//!                 // Route by tag; echo here.
//!                 registry.send(&connection, message, Lane::Low)?;
//!             }
//!             Event::Connected(_) | Event::Closed { .. } => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//! One read task and one write task per connection; any number of producers
//! may enqueue outbound messages concurrently. Each connection serializes its
//! queues behind one mutex and its teardown decision behind another, and
//! never shares either with other connections.

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
pub use protocol::message::{Lane, Message};
pub use transport::connection::{Connection, ConnectionId};
pub use transport::registry::{BanPredicate, Event, Registry};
