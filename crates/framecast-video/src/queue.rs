//! Bounded handoff queue between pipeline stages.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::{VideoError, VideoResult, STAGE_TIMEOUT};

/// First-in-first-out channel of uniquely owned items with a fixed
/// capacity. Safe under many producers and many consumers; ordering is
/// strict FIFO relative to successful pushes.
///
/// The queue owns both channel endpoints, so the only failure mode is a
/// timeout; callers loop and re-check the shutdown flag.
pub struct FrameQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    push_timeout: Duration,
    pop_timeout: Duration,
}

impl<T> FrameQueue<T> {
    /// A queue holding at most `capacity` items, with the default timeouts.
    pub fn new(capacity: usize) -> Self {
        Self::with_timeouts(capacity, STAGE_TIMEOUT, STAGE_TIMEOUT)
    }

    pub fn with_timeouts(capacity: usize, push_timeout: Duration, pop_timeout: Duration) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            push_timeout,
            pop_timeout,
        }
    }

    /// Enqueue `item`, waiting up to the push timeout for capacity. The
    /// item is dropped on timeout.
    pub fn push(&self, item: T) -> VideoResult<()> {
        self.tx.send_timeout(item, self.push_timeout).map_err(|err| {
            match err {
                SendTimeoutError::Timeout(_) | SendTimeoutError::Disconnected(_) => {
                    VideoError::QueueTimeout
                }
            }
        })
    }

    /// Dequeue the oldest item, waiting up to the pop timeout for data.
    pub fn pop(&self) -> VideoResult<T> {
        self.rx.recv_timeout(self.pop_timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected => VideoError::QueueTimeout,
        })
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
