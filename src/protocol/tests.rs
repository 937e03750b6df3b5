// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::core::codec::FrameCodec;
use crate::core::frame::{
    split_message, Frame, FrameHeader, FrameLimits, HEADER_SIZE, SPLIT_FRAME_TAG,
};
use crate::error::ProtocolError;
use crate::protocol::message::{Lane, Message};
use crate::protocol::reassembly::Reassembler;
use crate::protocol::scheduler::OutboundScheduler;
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CAP: usize = 64;

fn limits() -> FrameLimits {
    FrameLimits {
        max_frame_payload: CAP,
        max_message_size: 16 * CAP,
    }
}

fn wire(frames: &[Frame]) -> BytesMut {
    let mut codec = FrameCodec;
    let mut buf = BytesMut::new();
    for frame in frames {
        codec.encode(frame.clone(), &mut buf).expect("encode");
    }
    buf
}

fn drain(reassembler: &mut Reassembler, buf: &mut BytesMut) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(msg) = reassembler.decode(buf).expect("decode") {
        out.push(msg);
    }
    out
}

#[test]
fn header_rejects_negative_length() {
    let mut raw = [0u8; HEADER_SIZE];
    raw[..4].copy_from_slice(&(-5i32).to_be_bytes());
    let err = FrameHeader::parse(&raw, &limits()).unwrap_err();
    assert!(matches!(err, ProtocolError::MalformedFrame(_)));
}

#[test]
fn header_rejects_oversized_length() {
    let mut raw = [0u8; HEADER_SIZE];
    let total = (16 * CAP + 4 + 1) as i32;
    raw[..4].copy_from_slice(&total.to_be_bytes());
    raw[4..].copy_from_slice(&7i32.to_be_bytes());
    let err = FrameHeader::parse(&raw, &limits()).unwrap_err();
    assert!(matches!(err, ProtocolError::MalformedFrame(_)));
}

#[test]
fn small_message_is_one_frame() {
    let payload = Bytes::from(vec![0xAB; CAP]);
    let frames = split_message(7, &payload, CAP);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].tag, 7);
    assert_eq!(frames[0].declared_len, CAP);
}

#[test]
fn oversized_message_splits_into_ceil_frames() {
    // 3x the cap exactly: 3 frames, lead + 2 continuations
    let payload = Bytes::from(vec![0xCD; 3 * CAP]);
    let frames = split_message(9, &payload, CAP);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].tag, 9);
    assert_eq!(frames[0].declared_len, 3 * CAP);
    assert_eq!(frames[0].payload.len(), CAP);
    for continuation in &frames[1..] {
        assert_eq!(continuation.tag, SPLIT_FRAME_TAG);
        assert_eq!(continuation.declared_len, continuation.payload.len());
    }

    // One byte over the cap: 2 frames
    let payload = Bytes::from(vec![0xEE; CAP + 1]);
    assert_eq!(split_message(9, &payload, CAP).len(), 2);
}

#[test]
fn roundtrip_small_message() {
    let message = Message::new(3, vec![1u8, 2, 3, 4, 5]);
    let mut buf = wire(&message.to_frames(CAP));

    let mut reassembler = Reassembler::new(limits());
    let out = drain(&mut reassembler, &mut buf);
    assert_eq!(out, vec![message]);
    assert!(buf.is_empty());
}

#[test]
fn roundtrip_split_message_byte_identical() {
    let payload: Vec<u8> = (0..(3 * CAP + 17)).map(|i| (i % 251) as u8).collect();
    let message = Message::new(12, payload.clone());
    let frames = message.to_frames(CAP);
    assert_eq!(frames.len(), (3 * CAP + 17).div_ceil(CAP));

    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let out = drain(&mut reassembler, &mut buf);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].tag, 12);
    assert_eq!(&out[0].payload[..], &payload[..]);
}

#[test]
fn reassembles_across_arbitrary_chunk_boundaries() {
    // Streams do not respect frame boundaries: dribble one byte at a time.
    let message = Message::new(5, vec![0x42; 2 * CAP + 9]);
    let full = wire(&message.to_frames(CAP));

    let mut reassembler = Reassembler::new(limits());
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for byte in full {
        buf.extend_from_slice(&[byte]);
        out.extend(drain(&mut reassembler, &mut buf));
    }
    assert_eq!(out, vec![message]);
}

#[test]
fn partial_header_returns_none_and_keeps_buffer() {
    let mut reassembler = Reassembler::new(limits());
    let mut buf = BytesMut::from(&[0u8, 0, 0][..]);
    assert!(reassembler.decode(&mut buf).expect("decode").is_none());
    assert_eq!(buf.len(), 3);
}

#[test]
fn high_priority_frame_between_split_chunks_dispatches() {
    let bulk = Message::new(20, vec![0x11; 3 * CAP]);
    let control = Message::new(2, vec![0xFF; 4]);

    let mut frames = bulk.to_frames(CAP);
    // Control frame lands between the second and third chunk.
    frames.insert(2, Frame::new(control.tag, control.payload.clone()));

    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let out = drain(&mut reassembler, &mut buf);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0], control);
    assert_eq!(out[1], bulk);
}

#[test]
fn continuation_without_split_is_violation() {
    let mut buf = wire(&[Frame::new(SPLIT_FRAME_TAG, Bytes::from(vec![0u8; 8]))]);
    let mut reassembler = Reassembler::new(limits());
    let err = reassembler.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
}

#[test]
fn second_split_lead_is_violation() {
    let bulk = Message::new(20, vec![0x11; 3 * CAP]);
    let mut frames = bulk.to_frames(CAP);
    frames.truncate(1);
    // A second lead while the first transfer is incomplete.
    frames.extend(Message::new(21, vec![0x22; 2 * CAP]).to_frames(CAP));

    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let err = loop {
        match reassembler.decode(&mut buf) {
            Ok(Some(_)) => panic!("nothing should dispatch"),
            Ok(None) => panic!("violation expected before the buffer ran dry"),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
}

#[test]
fn continuation_overrun_is_violation() {
    let bulk = Message::new(20, vec![0x33; CAP + 10]);
    let mut frames = bulk.to_frames(CAP);
    assert_eq!(frames.len(), 2);
    // Inflate the final chunk beyond the declared total.
    frames[1] = Frame::new(SPLIT_FRAME_TAG, Bytes::from(vec![0x33; 11]));

    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let err = reassembler.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    assert!(reassembler.is_receiving_split());
}

#[test]
fn empty_continuation_is_violation() {
    let bulk = Message::new(20, vec![0x55; 2 * CAP]);
    let mut frames = bulk.to_frames(CAP);
    // A zero-length continuation would never decrement the countdown.
    frames.insert(1, Frame::new(SPLIT_FRAME_TAG, Bytes::new()));

    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let err = reassembler.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
    assert!(reassembler.is_receiving_split());
}

#[test]
fn violation_never_dispatches_partial_message() {
    let bulk = Message::new(20, vec![0x44; 2 * CAP + 1]);
    let mut frames = bulk.to_frames(CAP);
    frames.pop();
    frames.push(Frame::new(SPLIT_FRAME_TAG, Bytes::from(vec![0x44; CAP])));

    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let mut dispatched = Vec::new();
    let mut saw_error = false;
    loop {
        match reassembler.decode(&mut buf) {
            Ok(Some(msg)) => dispatched.push(msg),
            Ok(None) => break,
            Err(_) => {
                saw_error = true;
                break;
            }
        }
    }
    assert!(saw_error);
    assert!(dispatched.is_empty());
}

#[test]
fn unknown_reserved_tag_is_malformed() {
    let mut buf = wire(&[Frame::new(-7, Bytes::from(vec![0u8; 4]))]);
    let mut reassembler = Reassembler::new(limits());
    let err = reassembler.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProtocolError::MalformedFrame(_)));
}

#[test]
fn scheduler_high_preempts_low() {
    let scheduler = OutboundScheduler::new(CAP);
    scheduler
        .enqueue(Message::new(10, vec![1u8]), Lane::Low)
        .unwrap();
    scheduler
        .enqueue(Message::new(11, vec![2u8]), Lane::Low)
        .unwrap();
    scheduler
        .enqueue(Message::new(1, vec![3u8]), Lane::High)
        .unwrap();

    let first = scheduler.begin_send().unwrap().unwrap();
    assert_eq!(first.tag, 1);
    scheduler.complete_send().unwrap();

    let second = scheduler.begin_send().unwrap().unwrap();
    assert_eq!(second.tag, 10);
}

#[test]
fn scheduler_fifo_within_lane() {
    let scheduler = OutboundScheduler::new(CAP);
    for tag in [5, 6, 7] {
        scheduler
            .enqueue(Message::new(tag, vec![0u8]), Lane::Low)
            .unwrap();
    }
    for expected in [5, 6, 7] {
        let frame = scheduler.begin_send().unwrap().unwrap();
        assert_eq!(frame.tag, expected);
        scheduler.complete_send().unwrap();
    }
}

#[test]
fn scheduler_one_send_outstanding() {
    let scheduler = OutboundScheduler::new(CAP);
    scheduler
        .enqueue(Message::new(1, vec![0u8]), Lane::High)
        .unwrap();
    scheduler
        .enqueue(Message::new(2, vec![0u8]), Lane::High)
        .unwrap();

    assert!(scheduler.begin_send().unwrap().is_some());
    // Second claim while the first write is outstanding must refuse.
    assert!(scheduler.begin_send().unwrap().is_none());
    scheduler.complete_send().unwrap();
    assert!(scheduler.begin_send().unwrap().is_some());
}

#[test]
fn scheduler_split_frames_stay_contiguous_ahead_of_low() {
    let scheduler = OutboundScheduler::new(CAP);
    scheduler
        .enqueue(Message::new(30, vec![0xAA; 3 * CAP]), Lane::Low)
        .unwrap();
    scheduler
        .enqueue(Message::new(31, vec![0xBB; 4]), Lane::Low)
        .unwrap();

    let mut tags = Vec::new();
    while let Some(frame) = scheduler.begin_send().unwrap() {
        tags.push(frame.tag);
        scheduler.complete_send().unwrap();
    }
    // M-lead, M-cont, M-cont, then N
    assert_eq!(tags, vec![30, SPLIT_FRAME_TAG, SPLIT_FRAME_TAG, 31]);
}

#[test]
fn scheduler_oversized_high_waits_for_in_flight_split() {
    let scheduler = OutboundScheduler::new(CAP);
    scheduler
        .enqueue(Message::new(50, vec![0xAA; 3 * CAP]), Lane::Low)
        .unwrap();

    // Lead goes out; two continuations now sit in the split lane.
    let lead = scheduler.begin_send().unwrap().unwrap();
    assert_eq!(lead.tag, 50);
    scheduler.complete_send().unwrap();

    // An oversized High message arrives mid-transfer. It must not start a
    // second split; its frames follow the first transfer's remainder.
    scheduler
        .enqueue(Message::new(2, vec![0xBB; 2 * CAP]), Lane::High)
        .unwrap();

    let mut frames = vec![lead];
    while let Some(frame) = scheduler.begin_send().unwrap() {
        frames.push(frame);
        scheduler.complete_send().unwrap();
    }
    let tags: Vec<i32> = frames.iter().map(|f| f.tag).collect();
    assert_eq!(
        tags,
        vec![50, SPLIT_FRAME_TAG, SPLIT_FRAME_TAG, 2, SPLIT_FRAME_TAG]
    );

    // The emitted order must reassemble cleanly on the peer.
    let mut buf = wire(&frames);
    let mut reassembler = Reassembler::new(limits());
    let out = drain(&mut reassembler, &mut buf);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].tag, 50);
    assert_eq!(out[0].payload.len(), 3 * CAP);
    assert_eq!(out[1].tag, 2);
    assert_eq!(out[1].payload.len(), 2 * CAP);
}

#[test]
fn scheduler_rejects_reserved_tag() {
    let scheduler = OutboundScheduler::new(CAP);
    let err = scheduler
        .enqueue(Message::new(SPLIT_FRAME_TAG, vec![0u8]), Lane::Low)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ReservedTag(_)));
    let err = scheduler
        .enqueue(Message::new(0, vec![0u8]), Lane::High)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ReservedTag(0)));
}

#[test]
fn scheduler_shutdown_drops_queued_and_refuses_enqueue() {
    let scheduler = OutboundScheduler::new(CAP);
    scheduler
        .enqueue(Message::new(1, vec![0u8]), Lane::High)
        .unwrap();
    scheduler
        .enqueue(Message::new(2, vec![0u8]), Lane::Low)
        .unwrap();

    assert_eq!(scheduler.shutdown(), 2);
    assert!(scheduler.begin_send().unwrap().is_none());
    let err = scheduler
        .enqueue(Message::new(3, vec![0u8]), Lane::High)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[test]
fn scheduler_enqueue_into_split_lane_expands() {
    let scheduler = OutboundScheduler::new(CAP);
    scheduler
        .enqueue(Message::new(40, vec![0xCC; 2 * CAP]), Lane::Split)
        .unwrap();
    assert_eq!(scheduler.pending().unwrap(), 2);
}
