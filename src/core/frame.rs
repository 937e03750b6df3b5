//! Wire frame representation and message splitting.
//!
//! A frame is the unit written to the socket:
//!
//! ```text
//! [TotalLen(4, i32 BE)] [Tag(4, i32 BE)] [Payload(N)]
//! ```
//!
//! `TotalLen` covers the tag plus the *declared* body. For every frame except
//! a split lead, the declared body equals the bytes that follow on the wire.
//! A message whose payload exceeds the per-frame cap is carried as a lead
//! frame (original tag, full declared length, exactly one cap's worth of
//! payload) followed by continuation frames carrying the reserved tag; the
//! receiver counts the declared total down to zero, so no final-chunk marker
//! exists on the wire.

use crate::config::{DEFAULT_MAX_FRAME_PAYLOAD, MAX_MESSAGE_SIZE};
use crate::error::{ProtocolError, Result};
use bytes::Bytes;

/// Size of the fixed frame header: total length + tag.
pub const HEADER_SIZE: usize = 8;

/// Size of the tag field inside the declared total.
pub const TAG_SIZE: usize = 4;

/// Reserved tag marking a continuation chunk of a split message.
pub const SPLIT_FRAME_TAG: i32 = -1;

/// Bounds the codec enforces against a hostile or corrupted peer.
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    /// Maximum payload carried by a single frame.
    pub max_frame_payload: usize,
    /// Absolute cap on a logical message's declared payload, split or not.
    pub max_message_size: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_frame_payload: DEFAULT_MAX_FRAME_PAYLOAD,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl From<&crate::config::ProtocolConfig> for FrameLimits {
    fn from(config: &crate::config::ProtocolConfig) -> Self {
        Self {
            max_frame_payload: config.max_frame_payload,
            max_message_size: config.max_message_size,
        }
    }
}

/// One length-prefixed unit bound for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Application tag, or [`SPLIT_FRAME_TAG`] for a continuation chunk.
    pub tag: i32,
    /// Body length declared in the header. Equals `payload.len()` for every
    /// frame except a split lead, which declares the whole logical message.
    pub declared_len: usize,
    /// Payload bytes actually carried by this frame.
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame whose declared length matches its payload.
    pub fn new(tag: i32, payload: Bytes) -> Self {
        Self {
            tag,
            declared_len: payload.len(),
            payload,
        }
    }

    /// Bytes this frame occupies on the wire.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Parsed fixed-size frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame tag.
    pub tag: i32,
    /// Declared body length (total length minus the tag field).
    pub body_len: usize,
}

impl FrameHeader {
    /// Parse and bounds-check a fixed-size header.
    ///
    /// Rejects totals shorter than the tag field (including negative values)
    /// and declared bodies above the absolute message cap, both of which
    /// would otherwise let a peer drive allocations with arbitrary lengths.
    pub fn parse(buf: &[u8; HEADER_SIZE], limits: &FrameLimits) -> Result<Self> {
        let total_len = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if total_len < TAG_SIZE as i32 {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared frame length {total_len} is shorter than the tag field"
            )));
        }

        let body_len = total_len as usize - TAG_SIZE;
        if body_len > limits.max_message_size {
            return Err(ProtocolError::MalformedFrame(format!(
                "declared body of {body_len} bytes exceeds the {} byte message cap",
                limits.max_message_size
            )));
        }

        let tag = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self { tag, body_len })
    }
}

/// Expand one logical message into the exact frame sequence that carries it.
///
/// A payload within the cap yields a single frame. A larger payload yields
/// `ceil(len / cap)` frames: the lead (original tag, declared total, first
/// `cap` bytes) and continuation chunks under [`SPLIT_FRAME_TAG`]. Slices
/// share the source buffer; nothing is copied.
pub fn split_message(tag: i32, payload: &Bytes, max_frame_payload: usize) -> Vec<Frame> {
    let len = payload.len();
    if len <= max_frame_payload {
        return vec![Frame::new(tag, payload.clone())];
    }

    let mut frames = Vec::with_capacity(len.div_ceil(max_frame_payload));
    frames.push(Frame {
        tag,
        declared_len: len,
        payload: payload.slice(..max_frame_payload),
    });

    let mut offset = max_frame_payload;
    while offset < len {
        let end = usize::min(offset + max_frame_payload, len);
        frames.push(Frame::new(SPLIT_FRAME_TAG, payload.slice(offset..end)));
        offset = end;
    }

    frames
}
