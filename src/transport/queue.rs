//! FIFO outbound queue drained by a single writer task.
//!
//! A frame counts as pending from `push` until the writer reports it written
//! with `mark_sent`, so `is_flushed` only turns true once the socket has
//! accepted everything that was queued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::core::frame::Frame;

#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: Mutex<VecDeque<Frame>>,
    pending: AtomicUsize,
    ready: Notify,
    drained: Notify,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        frames.push_back(frame);
        self.pending.fetch_add(1, Ordering::AcqRel);
        drop(frames);
        self.ready.notify_one();
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    /// Wait for the next frame. Cancel safe.
    pub async fn pop(&self) -> Frame {
        loop {
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            self.ready.notified().await;
        }
    }

    /// Report one popped frame as written to the socket
    pub fn mark_sent(&self) {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        if previous <= 1 {
            self.drained.notify_waiters();
        }
    }

    /// Frames queued or popped but not yet written
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_flushed(&self) -> bool {
        self.pending() == 0
    }

    /// Resolve once every queued frame has been written
    pub async fn wait_flushed(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.is_flushed() {
                return;
            }
            drained.await;
        }
    }

    /// Discard queued frames, including one the writer may hold in flight
    pub fn clear(&self) -> usize {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let discarded = frames.len();
        frames.clear();
        self.pending.store(0, Ordering::Release);
        drop(frames);
        self.drained.notify_waiters();
        discarded
    }
}
