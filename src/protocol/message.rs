//! Logical message and outbound lane types.

use crate::core::frame::{split_message, Frame};
use bytes::Bytes;

/// One application-level unit of communication, possibly spanning multiple
/// frames on the wire.
///
/// The engine never interprets the payload; routing happens on the tag alone.
/// Application tags must be positive; non-positive values are reserved by
/// the wire protocol and rejected at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Application-defined type tag.
    pub tag: i32,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

impl Message {
    /// Build a message from a tag and any byte source.
    pub fn new(tag: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Expand into the exact frame sequence that carries this message.
    pub fn to_frames(&self, max_frame_payload: usize) -> Vec<Frame> {
        split_message(self.tag, &self.payload, max_frame_payload)
    }
}

/// Outbound priority lane.
///
/// Lanes are drained strictly in declaration order whenever the socket is
/// idle; within a lane, order is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// Control traffic: handshake responses, disconnect notices.
    High,
    /// Continuation chunks of in-progress split transfers.
    Split,
    /// Bulk traffic: world state, bulk synchronization.
    Low,
}
