//! Tokio codec writing frames onto a byte stream.

use crate::core::frame::{Frame, HEADER_SIZE, TAG_SIZE};
use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

/// Stateless encoder for [`Frame`]s.
///
/// Decoding is not frame-at-a-time: reassembly of logical messages, including
/// split transfers, lives in
/// [`Reassembler`](crate::protocol::reassembly::Reassembler), which implements
/// `Decoder` directly over the byte stream.
pub struct FrameCodec;

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(HEADER_SIZE + frame.payload.len());
        dst.put_i32((frame.declared_len + TAG_SIZE) as i32);
        dst.put_i32(frame.tag);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
