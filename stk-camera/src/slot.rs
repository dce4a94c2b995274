use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::frame::Frame;

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<Arc<Frame>>,
    /// Sequence number of the last frame handed to a reader.
    taken: u64,
    /// Set once the producer has given up, with its failure count.
    unavailable: Option<u32>,
}

/// Single-slot, overwrite-only hand-off between a capture thread and the
/// main loop. Publishing swaps the frame handle, so a reader only ever sees
/// whole frames.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever frame is waiting.
    pub fn publish(&self, frame: Frame) {
        let mut state = self.state.lock();
        state.frame = Some(Arc::new(frame));
        drop(state);
        self.ready.notify_all();
    }

    /// The newest frame not yet returned, waiting at most `timeout` for one.
    pub fn take_fresh(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let mut state = self.state.lock();
        let fresh = |s: &SlotState| s.frame.as_ref().is_some_and(|f| f.sequence > s.taken);
        let deadline = Instant::now() + timeout;
        while !fresh(&state) && state.unavailable.is_none() {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !fresh(&state) {
            return None;
        }
        let frame = state.frame.clone()?;
        state.taken = frame.sequence;
        Some(frame)
    }

    /// Like [`take_fresh`](Self::take_fresh) but returns a blank frame of the
    /// given size when nothing new arrived.
    pub fn latest_or_blank(&self, timeout: Duration, width: u32, height: u32) -> Arc<Frame> {
        self.take_fresh(timeout)
            .unwrap_or_else(|| Arc::new(Frame::blank(width, height)))
    }

    /// Most recent frame regardless of whether it was already taken.
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.state.lock().frame.clone()
    }

    pub fn mark_unavailable(&self, failures: u32) {
        self.state.lock().unavailable = Some(failures);
        self.ready.notify_all();
    }

    /// Consecutive read failures that made the producer give up.
    pub fn unavailable(&self) -> Option<u32> {
        self.state.lock().unavailable
    }
}
