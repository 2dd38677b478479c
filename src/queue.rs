//! Blocking FIFO between the acquisition path and the video writer thread.
//!
//! The queue never blocks producers. Its capacity is a soft threshold: the
//! acquisition side checks it through [`FrameQueue::offer`] and drops the incoming
//! frame when the writer is behind, so the writer thread is never the one deciding
//! what to lose.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::state::RecordingState;
use crate::traits::Frame;

/// Default soft capacity, in frames.
pub const DEFAULT_SOFT_CAPACITY: usize = 1000;

/// Element carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// A frame to encode.
    Frame(Frame),
    /// Close the current session once everything before it has been written.
    EndOfSession,
}

/// Outcome of offering a frame from the acquisition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Frame was appended to the queue.
    Queued,
    /// Recording is on but the writer is behind or gone; frame was discarded.
    Dropped,
    /// Recording is off; frame was discarded.
    NotRecording,
}

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<QueueItem>,
    /// Items pushed but not yet reported done by the consumer.
    outstanding: usize,
    /// The consumer is gone; pushes are discarded.
    abandoned: bool,
}

/// Thread-safe FIFO with a blocking `pop` and a soft capacity.
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    drained: Condvar,
    soft_capacity: usize,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(DEFAULT_SOFT_CAPACITY)
    }
}

impl FrameQueue {
    /// Create an empty queue with the given soft capacity.
    #[must_use]
    pub fn new(soft_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            not_empty: Condvar::new(),
            drained: Condvar::new(),
            soft_capacity,
        }
    }

    /// Advisory size above which the acquisition side drops frames.
    pub const fn soft_capacity(&self) -> usize {
        self.soft_capacity
    }

    /// Number of items currently waiting in the queue.
    pub fn filled_size(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Items pushed and not yet fully handled, including the one being processed.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding
    }

    /// Append an item at the tail. Never blocks.
    pub fn push(&self, item: QueueItem) {
        let mut inner = self.inner.lock();
        Self::push_locked(&mut inner, item);
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Acquisition-side gate: queue `frame` only if recording and under capacity.
    ///
    /// The recording flag is read under the queue lock, so a frame can never slip in
    /// behind the sentinel pushed by [`FrameQueue::end_session`].
    pub fn offer(&self, frame: Frame, state: &RecordingState) -> Offer {
        let mut inner = self.inner.lock();
        if !state.is_recording() {
            return Offer::NotRecording;
        }
        if inner.abandoned || inner.items.len() >= self.soft_capacity {
            return Offer::Dropped;
        }
        Self::push_locked(&mut inner, QueueItem::Frame(frame));
        drop(inner);
        self.not_empty.notify_one();
        Offer::Queued
    }

    /// Turn recording off and, if it was on, append the sentinel in one step.
    ///
    /// Returns whether recording was on.
    pub fn end_session(&self, state: &RecordingState) -> bool {
        let mut inner = self.inner.lock();
        let was_recording = state.set_recording(false);
        if !was_recording {
            return false;
        }
        Self::push_locked(&mut inner, QueueItem::EndOfSession);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Remove and return the head, blocking while the queue is empty.
    pub fn pop(&self) -> QueueItem {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return item;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Consumer reports that a popped item has been completely handled.
    pub fn task_done(&self) {
        let mut inner = self.inner.lock();
        inner.outstanding = inner.outstanding.saturating_sub(1);
        if inner.outstanding == 0 {
            self.drained.notify_all();
        }
    }

    /// Consumer is going away without handling the rest of the queue.
    ///
    /// Queued items are discarded, later pushes are ignored and every
    /// [`FrameQueue::wait_drained`] caller is released.
    pub fn abandon(&self) {
        let mut inner = self.inner.lock();
        inner.abandoned = true;
        inner.items.clear();
        inner.outstanding = 0;
        drop(inner);
        self.drained.notify_all();
    }

    /// Block until every pushed item has been handled.
    ///
    /// `on_tick` is called with the number of outstanding items every `poll` interval
    /// while waiting, without the queue lock held. Returns `false` when the queue was
    /// abandoned instead of drained.
    pub fn wait_drained<F>(&self, poll: Duration, mut on_tick: F) -> bool
    where
        F: FnMut(usize),
    {
        let mut inner = self.inner.lock();
        while inner.outstanding > 0 {
            let remaining = inner.outstanding;
            MutexGuard::unlocked(&mut inner, || on_tick(remaining));
            if inner.outstanding == 0 {
                break;
            }
            // Timeouts just re-run the loop, which logs progress again.
            let _ = self.drained.wait_for(&mut inner, poll);
        }
        !inner.abandoned
    }

    fn push_locked(inner: &mut Inner, item: QueueItem) {
        if inner.abandoned {
            return;
        }
        inner.items.push_back(item);
        inner.outstanding += 1;
    }
}
