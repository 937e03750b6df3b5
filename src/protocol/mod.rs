//! # Protocol Layer
//!
//! Message-level logic above the raw wire format: the logical message type,
//! inbound reassembly of the byte stream (including split transfers), and the
//! outbound priority-lane scheduler.

pub mod message;
pub mod reassembly;
pub mod scheduler;

#[cfg(test)]
mod tests;
