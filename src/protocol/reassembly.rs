//! Inbound byte-stream reassembly.
//!
//! The socket delivers arbitrary-sized chunks that do not respect frame
//! boundaries, so decoding is an explicit state machine: accumulate the fixed
//! header, then the declared body, then emit. A split transfer adds an
//! orthogonal assembly that survives across frames until its declared total
//! has been counted down to zero.
//!
//! The split sub-state is orthogonal: a complete high-priority frame arriving
//! between continuation chunks dispatches normally without disturbing the
//! assembly. Violations (a continuation with no split in progress, a second
//! split lead, a chunk overrunning the declared total) are fatal to the
//! connection, and partially assembled buffers are discarded, never
//! dispatched.

use crate::core::frame::{FrameHeader, FrameLimits, HEADER_SIZE, SPLIT_FRAME_TAG};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

/// Decode state: either waiting for a full header, or for the wire body the
/// last header declared.
#[derive(Debug, Clone, Copy)]
enum ReadState {
    AwaitingHeader,
    ReceivingBody {
        header: FrameHeader,
        /// Bytes this frame actually carries on the wire. Differs from
        /// `header.body_len` only for a split lead.
        wire_len: usize,
        split_lead: bool,
    },
}

/// In-progress split message, at most one per connection.
#[derive(Debug)]
struct SplitAssembly {
    tag: i32,
    buf: BytesMut,
    bytes_left: usize,
}

/// Per-connection state machine turning raw bytes into complete [`Message`]s.
#[derive(Debug)]
pub struct Reassembler {
    limits: FrameLimits,
    state: ReadState,
    split: Option<SplitAssembly>,
}

impl Reassembler {
    /// Create a reassembler enforcing the given wire bounds.
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            limits,
            state: ReadState::AwaitingHeader,
            split: None,
        }
    }

    /// Whether a split transfer is currently being assembled.
    pub fn is_receiving_split(&self) -> bool {
        self.split.is_some()
    }

    /// Validate a parsed header against the current state and work out how
    /// many wire bytes its body occupies.
    fn classify(&mut self, header: &FrameHeader) -> Result<(usize, bool)> {
        if header.tag == SPLIT_FRAME_TAG {
            let assembly = self.split.as_ref().ok_or_else(|| {
                ProtocolError::ProtocolViolation(
                    "split continuation received with no split transfer in progress".into(),
                )
            })?;
            if header.body_len == 0 {
                // Would never decrement the countdown; a peer could spin
                // these forever.
                return Err(ProtocolError::ProtocolViolation(
                    "empty split continuation makes no progress".into(),
                ));
            }
            if header.body_len > self.limits.max_frame_payload {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "continuation of {} bytes exceeds the {} byte frame cap",
                    header.body_len, self.limits.max_frame_payload
                )));
            }
            if header.body_len > assembly.bytes_left {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "continuation of {} bytes overruns the {} bytes left in the split transfer",
                    header.body_len, assembly.bytes_left
                )));
            }
            return Ok((header.body_len, false));
        }

        if header.tag <= 0 {
            return Err(ProtocolError::MalformedFrame(format!(
                "unknown reserved tag {}",
                header.tag
            )));
        }

        if header.body_len > self.limits.max_frame_payload {
            // Only one split transfer may be in flight per direction.
            if self.split.is_some() {
                return Err(ProtocolError::ProtocolViolation(format!(
                    "split lead with tag {} received while another split transfer is in progress",
                    header.tag
                )));
            }
            // Split lead: the header declares the whole logical message but
            // the frame carries exactly one cap's worth of payload.
            self.split = Some(SplitAssembly {
                tag: header.tag,
                buf: BytesMut::with_capacity(header.body_len),
                bytes_left: header.body_len,
            });
            trace!(tag = header.tag, total = header.body_len, "split transfer started");
            return Ok((self.limits.max_frame_payload, true));
        }

        Ok((header.body_len, false))
    }

    /// Fold a completed frame body into the machine, emitting a message when
    /// one finishes.
    fn complete_frame(
        &mut self,
        header: FrameHeader,
        split_lead: bool,
        body: Bytes,
    ) -> Result<Option<Message>> {
        if header.tag == SPLIT_FRAME_TAG || split_lead {
            let finished = {
                let assembly = self.split.as_mut().ok_or_else(|| {
                    ProtocolError::ProtocolViolation(
                        "split frame completed with no split transfer in progress".into(),
                    )
                })?;
                assembly.buf.extend_from_slice(&body);
                assembly.bytes_left -= body.len();
                assembly.bytes_left == 0
            };

            if finished {
                if let Some(done) = self.split.take() {
                    trace!(tag = done.tag, len = done.buf.len(), "split transfer complete");
                    return Ok(Some(Message {
                        tag: done.tag,
                        payload: done.buf.freeze(),
                    }));
                }
            }
            return Ok(None);
        }

        Ok(Some(Message {
            tag: header.tag,
            payload: body,
        }))
    }
}

impl Decoder for Reassembler {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    if src.len() < HEADER_SIZE {
                        src.reserve(HEADER_SIZE - src.len());
                        return Ok(None);
                    }

                    let mut raw = [0u8; HEADER_SIZE];
                    raw.copy_from_slice(&src[..HEADER_SIZE]);
                    let header = FrameHeader::parse(&raw, &self.limits)?;
                    let (wire_len, split_lead) = self.classify(&header)?;

                    src.advance(HEADER_SIZE);
                    self.state = ReadState::ReceivingBody {
                        header,
                        wire_len,
                        split_lead,
                    };
                }
                ReadState::ReceivingBody {
                    header,
                    wire_len,
                    split_lead,
                } => {
                    if src.len() < wire_len {
                        src.reserve(wire_len - src.len());
                        return Ok(None);
                    }

                    let body = src.split_to(wire_len).freeze();
                    self.state = ReadState::AwaitingHeader;

                    if let Some(message) = self.complete_frame(header, split_lead, body)? {
                        return Ok(Some(message));
                    }
                    // Mid-split: keep consuming whatever is already buffered.
                }
            }
        }
    }
}
