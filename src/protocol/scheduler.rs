//! Outbound priority-lane scheduler.
//!
//! Each connection owns one scheduler with three lanes: High for control
//! traffic, Split for continuation chunks of in-progress split transfers, and
//! Low for bulk. Producers on any task enqueue concurrently; the connection's
//! writer task drains one frame at a time, so exactly one physical write is
//! outstanding per connection.
//!
//! When an oversized message is picked for sending, its continuation frames
//! are injected at the *front* of the Split lane, so no frame from another
//! logical message can interleave with an in-progress transfer and break
//! reassembly ordering on the peer. Lane order is strict (High, then Split,
//! then Low) so control traffic is never starved behind bulk, and Low
//! traffic waits until every pending split chunk is on the wire. One
//! exception keeps the wire valid: an oversized High message cannot start
//! while another transfer's continuations are pending (the peer accepts one
//! split per direction), so its frames queue behind them instead.

use crate::core::frame::Frame;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{Lane, Message};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::trace;

/// Whether a physical write is currently outstanding on the socket.
/// A state, not a counter: `begin_send` refuses while `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendState {
    Idle,
    Sending,
}

#[derive(Debug)]
struct Inner {
    high: VecDeque<Message>,
    split: VecDeque<Frame>,
    low: VecDeque<Message>,
    send_state: SendState,
    last_send: Instant,
    shut_down: bool,
}

impl Inner {
    fn pending(&self) -> usize {
        self.high.len() + self.split.len() + self.low.len()
    }
}

/// Per-connection outbound queue set.
#[derive(Debug)]
pub struct OutboundScheduler {
    inner: Mutex<Inner>,
    writable: Notify,
    max_frame_payload: usize,
}

impl OutboundScheduler {
    /// Create a scheduler splitting messages at the given frame payload cap.
    pub fn new(max_frame_payload: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                high: VecDeque::new(),
                split: VecDeque::new(),
                low: VecDeque::new(),
                send_state: SendState::Idle,
                last_send: Instant::now(),
                shut_down: false,
            }),
            writable: Notify::new(),
            max_frame_payload,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ProtocolError::LockPoisoned(constants::ERR_LOCK_POISONED))
    }

    /// Append a message to a lane's tail. Callable from any task.
    ///
    /// Rejects reserved (non-positive) tags and refuses once teardown has
    /// begun, so nothing new can slip in behind a disconnect.
    pub fn enqueue(&self, message: Message, lane: Lane) -> Result<()> {
        if message.tag <= 0 {
            return Err(ProtocolError::ReservedTag(message.tag));
        }

        {
            let mut inner = self.lock()?;
            if inner.shut_down {
                return Err(ProtocolError::ConnectionClosed);
            }
            match lane {
                Lane::High => inner.high.push_back(message),
                Lane::Low => inner.low.push_back(message),
                // Enqueuing straight into the split lane expands immediately;
                // the lane holds frames, not messages.
                Lane::Split => {
                    for frame in message.to_frames(self.max_frame_payload) {
                        inner.split.push_back(frame);
                    }
                }
            }
        }

        self.writable.notify_one();
        Ok(())
    }

    /// Claim the next frame to write, or `None` if a send is already
    /// outstanding or every lane is empty.
    ///
    /// Lane priority is strict: High, then Split, then Low. An oversized
    /// message picked here yields its lead frame; its continuations go to the
    /// front of the Split lane so no unrelated bulk frame can interleave with
    /// the transfer. An oversized High message found while split frames are
    /// already pending is expanded behind them instead, so a second transfer
    /// never starts mid-flight.
    pub fn begin_send(&self) -> Result<Option<Frame>> {
        let mut inner = self.lock()?;
        if inner.send_state == SendState::Sending || inner.shut_down {
            return Ok(None);
        }

        // The peer accepts one split transfer at a time, so an oversized High
        // message must not start a second one while another transfer's
        // continuations are pending. Its frames queue behind them; only
        // within-cap High frames cut between continuation chunks.
        while !inner.split.is_empty()
            && inner
                .high
                .front()
                .is_some_and(|message| message.payload.len() > self.max_frame_payload)
        {
            if let Some(message) = inner.high.pop_front() {
                for frame in message.to_frames(self.max_frame_payload) {
                    inner.split.push_back(frame);
                }
            }
        }

        let frame = if let Some(message) = inner.high.pop_front() {
            Self::expand(&mut inner, message, self.max_frame_payload)
        } else if let Some(frame) = inner.split.pop_front() {
            frame
        } else if let Some(message) = inner.low.pop_front() {
            Self::expand(&mut inner, message, self.max_frame_payload)
        } else {
            return Ok(None);
        };

        inner.send_state = SendState::Sending;
        trace!(tag = frame.tag, bytes = frame.payload.len(), "frame claimed for send");
        Ok(Some(frame))
    }

    fn expand(inner: &mut Inner, message: Message, max_frame_payload: usize) -> Frame {
        let mut frames = message.to_frames(max_frame_payload).into_iter();
        // split_message always yields at least one frame
        let lead = frames
            .next()
            .unwrap_or_else(|| Frame::new(message.tag, message.payload));
        for continuation in frames.rev() {
            inner.split.push_front(continuation);
        }
        lead
    }

    /// Mark the outstanding write finished and wake the writer for the next
    /// drain decision.
    pub fn complete_send(&self) -> Result<()> {
        {
            let mut inner = self.lock()?;
            inner.send_state = SendState::Idle;
            inner.last_send = Instant::now();
        }
        self.writable.notify_one();
        Ok(())
    }

    /// Wait until a frame may be available to send.
    pub async fn wait_writable(&self) {
        self.writable.notified().await;
    }

    /// True when every lane is empty and no write is outstanding.
    pub fn is_drained(&self) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner.pending() == 0 && inner.send_state == SendState::Idle)
    }

    /// Queued messages and frames across all lanes.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.pending())
    }

    /// Time since the last completed write.
    pub fn last_send_elapsed(&self) -> Result<Duration> {
        Ok(self.lock()?.last_send.elapsed())
    }

    /// Discard all queued traffic and refuse further enqueues. Returns how
    /// many queued entries were dropped. Idempotent; called once teardown has
    /// been decided.
    pub fn shutdown(&self) -> usize {
        // Teardown must finish even if a producer panicked mid-enqueue.
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.shut_down = true;
        let dropped = inner.pending();
        inner.high.clear();
        inner.split.clear();
        inner.low.clear();
        drop(inner);

        self.writable.notify_one();
        dropped
    }
}
