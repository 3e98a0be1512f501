//! Bounded ingestion queue between the link reader and the processor
//!
//! The link-reading thread must never stall (a blocked read loop loses
//! line synchronization with the adapter), so the hand-off is a bounded
//! lock-free queue with a non-blocking producer side.
//!
//! Overflow policy: **drop-newest**. When the queue is full the offered
//! frame is discarded silently and counted; live monitoring tolerates
//! losing frames but not stalling. Sustained overflow is reported through
//! a rate-limited warning.

use crate::types::Frame;
use crossbeam_queue::ArrayQueue;
use log::warn;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default queue capacity, a few seconds of dense traffic at ~1 kHz.
pub const DEFAULT_CAPACITY: usize = 4096;

/// How many drops accumulate between overflow warnings.
const DROP_WARN_EVERY: u64 = 500;

/// Bounded single-producer/single-consumer frame queue.
///
/// Producer side: the link reader or the playback engine (serialized
/// upstream: both go through the same [`crate::monitor::FrameInjector`]).
/// Consumer side: the single processing thread.
pub struct FrameQueue {
    queue: ArrayQueue<Frame>,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        FrameQueue {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Offer a frame without blocking.
    ///
    /// Returns `true` if the frame was enqueued, `false` if the queue was
    /// full and the frame was dropped.
    pub fn push(&self, frame: Frame) -> bool {
        match self.queue.push(frame) {
            Ok(()) => true,
            Err(_) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % DROP_WARN_EVERY == 1 {
                    warn!(
                        "Ingestion queue full ({} slots) - {} frames dropped so far",
                        self.queue.capacity(),
                        dropped
                    );
                }
                false
            }
        }
    }

    /// Take the oldest queued frame, if any.
    pub fn pop(&self) -> Option<Frame> {
        self.queue.pop()
    }

    /// Total frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: &str) -> Frame {
        Frame {
            id: id.to_string(),
            rtr: false,
            ide: false,
            dlc: 8,
            payload: [0; 8],
            capture_time: 0.0,
        }
    }

    #[test]
    fn fifo_order() {
        let q = FrameQueue::new(4);
        assert!(q.push(frame("A")));
        assert!(q.push(frame("B")));
        assert_eq!(q.pop().unwrap().id, "A");
        assert_eq!(q.pop().unwrap().id, "B");
        assert!(q.pop().is_none());
    }

    #[test]
    fn overflow_drops_newest_and_counts() {
        let q = FrameQueue::new(2);
        assert!(q.push(frame("A")));
        assert!(q.push(frame("B")));
        assert!(!q.push(frame("C")));
        assert_eq!(q.dropped(), 1);

        // the queued frames are untouched, the overflow victim is the new one
        assert_eq!(q.pop().unwrap().id, "A");
        assert_eq!(q.pop().unwrap().id, "B");
        assert!(q.pop().is_none());
    }

    #[test]
    fn capacity_is_at_least_one() {
        let q = FrameQueue::new(0);
        assert_eq!(q.capacity(), 1);
        assert!(q.push(frame("A")));
        assert!(!q.push(frame("B")));
    }
}
