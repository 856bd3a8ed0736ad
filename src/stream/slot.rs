//! Latest-frame handoff between the encoder callback and client sessions
//!
//! A single-slot, overwrite-on-write buffer: the producer publishes each
//! encoded frame wholesale, consumers wait for a sequence number newer
//! than the one they last wrote out. There is no queueing - a slow
//! session simply observes the latest frame, so memory stays bounded no
//! matter how many clients are connected or how far behind they fall.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;

use crate::camera::driver::EncodedSink;
use crate::camera::Frame;

#[derive(Debug, Clone)]
struct SlotState {
    frame: Option<Frame>,
    /// Publish counter; survives `clear` so sequences never repeat
    sequence: u64,
    open: bool,
}

/// Signal that preview streaming stopped and no further frames will come
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEnded;

/// Shared handle to the slot. Cloning is cheap; all clones publish into
/// and observe the same state.
#[derive(Clone)]
pub struct FrameSlot {
    tx: Arc<watch::Sender<SlotState>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SlotState {
            frame: None,
            sequence: 0,
            open: false,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Arm the slot when an encoder attaches
    pub fn open(&self) {
        self.tx.send_modify(|state| state.open = true);
    }

    /// Empty the slot and release every blocked waiter with
    /// [`StreamEnded`]. The sequence counter is preserved.
    pub fn clear(&self) {
        self.tx.send_modify(|state| {
            state.frame = None;
            state.open = false;
        });
    }

    pub fn is_open(&self) -> bool {
        self.tx.borrow().open
    }

    /// Overwrite the stored frame and wake all waiters. Called from the
    /// producer context only; O(1) and never blocks on consumers.
    pub fn publish(&self, data: Bytes) {
        self.tx.send_modify(|state| {
            if !state.open {
                // Late frame from an encoder that is being torn down
                return;
            }
            state.sequence += 1;
            state.frame = Some(Frame {
                data,
                sequence: state.sequence,
            });
        });
    }

    pub fn subscribe(&self) -> FrameReceiver {
        FrameReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodedSink for FrameSlot {
    fn write_frame(&self, data: Bytes) {
        self.publish(data);
    }
}

/// Per-consumer view of the slot
pub struct FrameReceiver {
    rx: watch::Receiver<SlotState>,
}

impl FrameReceiver {
    /// Wait until the slot holds a frame with a sequence number strictly
    /// greater than `since`, then return a snapshot of it. Returns
    /// [`StreamEnded`] once the slot is cleared, including for waiters
    /// already blocked at that moment.
    pub async fn next_frame(&mut self, since: Option<u64>) -> Result<Frame, StreamEnded> {
        let state = self
            .rx
            .wait_for(|state| {
                !state.open
                    || state
                        .frame
                        .as_ref()
                        .map_or(false, |f| since.map_or(true, |n| f.sequence > n))
            })
            .await
            .map_err(|_| StreamEnded)?;

        if !state.open {
            return Err(StreamEnded);
        }
        state.frame.clone().ok_or(StreamEnded)
    }
}
