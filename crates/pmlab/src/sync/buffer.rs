// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded per-connection frame queue.
//!
//! Fixed array of `capacity` slots holding a live window `[start, start+count)`:
//!
//! ```text
//! before push (start=3, count=4, capacity=8):
//!   [ - | - | - | F3 | F4 | F5 | F6 | - ]
//!                 ^start
//! window end would hit capacity -> compact:
//!   [ F3 | F4 | F5 | F6 | new | - | - | - ]
//! ```
//!
//! Single producer (handler) / single consumer (sender). A push that finds
//! the array saturated with unconsumed frames returns [`PushOutcome::Overflow`]
//! and leaves the queue unchanged; the caller drops the connection.

use crate::protocol::Frame;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Default queue capacity (frames).
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Result of [`ClientBuffer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Queue saturated; frame was not stored
    Overflow,
}

/// Result of [`ClientBuffer::pop`] and [`ClientBuffer::pop_timeout`].
#[derive(Debug)]
pub enum PopOutcome {
    Frame(Frame),
    /// Queue is empty and was closed
    Closed,
    /// Timeout elapsed with nothing queued
    Empty,
}

#[derive(Debug)]
struct Slots {
    slots: Vec<Option<Frame>>,
    start: usize,
    count: usize,
    closed: bool,
    compactions: u64,
}

impl Slots {
    fn end(&self) -> usize {
        self.start + self.count
    }

    fn compact(&mut self) {
        let end = self.end();
        self.slots[..end].rotate_left(self.start);
        self.start = 0;
        self.compactions += 1;
    }
}

/// Lock-protected compacting queue shared by one handler/sender pair.
#[derive(Debug)]
pub struct ClientBuffer {
    inner: Mutex<Slots>,
    not_empty: Condvar,
    capacity: usize,
}

impl ClientBuffer {
    /// Create an empty buffer holding at most `capacity` frames.
    ///
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Slots {
                slots,
                start: 0,
                count: 0,
                closed: false,
                compactions: 0,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times the live window was moved back to offset 0.
    pub fn compactions(&self) -> u64 {
        self.inner.lock().compactions
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Append a frame, compacting once if the window reached the end.
    pub fn push(&self, frame: Frame) -> PushOutcome {
        let mut inner = self.inner.lock();
        if inner.closed {
            return PushOutcome::Overflow;
        }

        if inner.end() >= self.capacity {
            if inner.start == 0 {
                return PushOutcome::Overflow;
            }
            inner.compact();
        }

        let end = inner.end();
        inner.slots[end] = Some(frame);
        inner.count += 1;
        self.not_empty.notify_all();
        PushOutcome::Accepted
    }

    /// Take the oldest frame without blocking.
    pub fn try_pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock();
        Self::take_front(&mut inner)
    }

    /// Take the oldest frame, waiting up to `timeout` for one.
    ///
    /// Queued frames are still returned after [`close`](Self::close);
    /// `Closed` is reported only once the queue is empty.
    pub fn pop_timeout(&self, timeout: Duration) -> PopOutcome {
        let mut inner = self.inner.lock();
        let mut waited = false;
        loop {
            if let Some(frame) = Self::take_front(&mut inner) {
                return PopOutcome::Frame(frame);
            }
            if inner.closed {
                return PopOutcome::Closed;
            }
            if waited {
                return PopOutcome::Empty;
            }
            waited = self.not_empty.wait_for(&mut inner, timeout).timed_out();
        }
    }

    /// Block until a frame is available or the buffer is closed.
    ///
    /// Wakes every `wait` to poll `stop`; once it returns `true` the call
    /// reports [`PopOutcome::Closed`]. Never returns `Empty`.
    pub fn pop<F: Fn() -> bool>(&self, wait: Duration, stop: F) -> PopOutcome {
        loop {
            match self.pop_timeout(wait) {
                PopOutcome::Empty if stop() => return PopOutcome::Closed,
                PopOutcome::Empty => continue,
                other => return other,
            }
        }
    }

    /// Refuse further pushes and wake a blocked consumer.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_empty.notify_all();
    }

    /// Close the buffer and free every queued frame.
    ///
    /// Returns the number of frames discarded.
    pub fn drain_and_free(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let dropped = inner.count;
        for slot in inner.slots.iter_mut() {
            *slot = None;
        }
        inner.start = 0;
        inner.count = 0;
        self.not_empty.notify_all();
        dropped
    }

    fn take_front(inner: &mut Slots) -> Option<Frame> {
        if inner.count == 0 {
            return None;
        }
        let start = inner.start;
        let frame = inner.slots[start].take();
        inner.start += 1;
        inner.count -= 1;
        frame
    }
}

impl Default for ClientBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn frame(ts: u64) -> Frame {
        Frame::new(ts, 1, 1, vec![ts as f64], vec![false]).unwrap()
    }

    fn pop_ts(buffer: &ClientBuffer) -> Option<u64> {
        buffer.try_pop().map(|f| f.timestamp_nanos())
    }

    #[test]
    fn test_fifo_order() {
        let buffer = ClientBuffer::new(4);
        for ts in 1..=3 {
            assert_eq!(buffer.push(frame(ts)), PushOutcome::Accepted);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(pop_ts(&buffer), Some(1));
        assert_eq!(pop_ts(&buffer), Some(2));
        assert_eq!(pop_ts(&buffer), Some(3));
        assert_eq!(pop_ts(&buffer), None);
    }

    #[test]
    fn test_full_buffer_overflows() {
        let buffer = ClientBuffer::new(4);
        for ts in 0..4 {
            assert_eq!(buffer.push(frame(ts)), PushOutcome::Accepted);
        }
        assert_eq!(buffer.push(frame(99)), PushOutcome::Overflow);
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.compactions(), 0);
        assert_eq!(pop_ts(&buffer), Some(0));
    }

    #[test]
    fn test_push_compacts_consumed_prefix() {
        let buffer = ClientBuffer::new(4);
        for ts in 0..4 {
            buffer.push(frame(ts));
        }
        assert_eq!(pop_ts(&buffer), Some(0));
        assert_eq!(pop_ts(&buffer), Some(1));

        // window is [2, 4): a naive append would run past the array
        assert_eq!(buffer.push(frame(4)), PushOutcome::Accepted);
        assert_eq!(buffer.compactions(), 1);
        assert_eq!(buffer.push(frame(5)), PushOutcome::Accepted);
        assert_eq!(buffer.push(frame(6)), PushOutcome::Overflow);

        let drained: Vec<u64> = std::iter::from_fn(|| pop_ts(&buffer)).collect();
        assert_eq!(drained, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_compaction_with_single_live_frame() {
        let buffer = ClientBuffer::new(3);
        for ts in 0..3 {
            buffer.push(frame(ts));
        }
        pop_ts(&buffer);
        pop_ts(&buffer);
        assert_eq!(buffer.push(frame(3)), PushOutcome::Accepted);
        assert_eq!(pop_ts(&buffer), Some(2));
        assert_eq!(pop_ts(&buffer), Some(3));
    }

    #[test]
    fn test_pop_timeout_empty() {
        let buffer = ClientBuffer::new(2);
        assert!(matches!(
            buffer.pop_timeout(Duration::from_millis(10)),
            PopOutcome::Empty
        ));
    }

    #[test]
    fn test_pop_stops_on_request() {
        let buffer = ClientBuffer::new(2);
        let polls = std::cell::Cell::new(0);
        let outcome = buffer.pop(Duration::from_millis(5), || {
            polls.set(polls.get() + 1);
            polls.get() >= 3
        });
        assert!(matches!(outcome, PopOutcome::Closed));
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let buffer = ClientBuffer::new(2);
        buffer.push(frame(7));
        buffer.close();

        assert_eq!(buffer.push(frame(8)), PushOutcome::Overflow);
        match buffer.pop_timeout(Duration::from_millis(10)) {
            PopOutcome::Frame(f) => assert_eq!(f.timestamp_nanos(), 7),
            other => panic!("expected frame, got {:?}", other),
        }
        assert!(matches!(
            buffer.pop_timeout(Duration::from_millis(10)),
            PopOutcome::Closed
        ));
    }

    #[test]
    fn test_push_wakes_blocked_pop() {
        let buffer = Arc::new(ClientBuffer::new(2));
        let consumer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || buffer.pop_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        buffer.push(frame(5));

        match consumer.join().unwrap() {
            PopOutcome::Frame(f) => assert_eq!(f.timestamp_nanos(), 5),
            other => panic!("expected frame, got {:?}", other),
        }
    }

    #[test]
    fn test_drain_and_free() {
        let buffer = ClientBuffer::new(4);
        buffer.push(frame(1));
        buffer.push(frame(2));
        assert_eq!(buffer.drain_and_free(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.is_closed());
        assert!(matches!(
            buffer.pop_timeout(Duration::from_millis(1)),
            PopOutcome::Closed
        ));
    }

    #[test]
    fn test_zero_capacity_bumped() {
        let buffer = ClientBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.push(frame(0)), PushOutcome::Accepted);
        assert_eq!(buffer.push(frame(1)), PushOutcome::Overflow);
    }
}
