//! Bounded per-session outbound queue with drop-oldest overflow.
//!
//! Producers never wait: a push onto a full queue evicts the oldest pending
//! frame. The connection task drains the queue with [`OutboundQueue::recv`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// A serialized text frame, shared between every recipient of a broadcast.
pub type Frame = Arc<str>;

/// The responder position an incremental frame carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionTag {
    pub responder_id: Arc<str>,
    pub timestamp: i64,
}

impl PositionTag {
    pub fn new(responder_id: &str, timestamp: i64) -> Self {
        Self {
            responder_id: Arc::from(responder_id),
            timestamp,
        }
    }
}

struct Queued {
    frame: Frame,
    position: Option<PositionTag>,
}

struct Inner {
    /// Connect-time frames (`ready`, snapshot). Drained first and never
    /// evicted.
    bootstrap: VecDeque<Frame>,
    frames: VecDeque<Queued>,
    closed: bool,
}

pub struct OutboundQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                bootstrap: VecDeque::with_capacity(2),
                frames: VecDeque::with_capacity(capacity.min(64)),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame. Returns `true` if an older frame was evicted to make
    /// room. Frames pushed after [`close`](Self::close) are discarded.
    pub fn push(&self, frame: Frame) -> bool {
        self.enqueue(Queued {
            frame,
            position: None,
        })
    }

    /// Enqueue an incremental position frame. Same overflow rules as
    /// [`push`](Self::push).
    pub fn push_position(&self, frame: Frame, position: PositionTag) -> bool {
        self.enqueue(Queued {
            frame,
            position: Some(position),
        })
    }

    fn enqueue(&self, queued: Queued) -> bool {
        let evicted = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return false;
            }
            let mut evicted = false;
            while inner.frames.len() >= self.capacity {
                inner.frames.pop_front();
                evicted = true;
            }
            inner.frames.push_back(queued);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Enqueue a connect-time frame ahead of every incremental frame.
    /// Bootstrap frames keep their push order and do not count against the
    /// capacity.
    pub fn push_bootstrap(&self, frame: Frame) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.bootstrap.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Drop queued position frames that `covered` already reports at the
    /// same or a newer timestamp. Returns how many were dropped.
    pub fn discard_covered<F>(&self, covered: F) -> usize
    where
        F: Fn(&str) -> Option<i64>,
    {
        let mut inner = self.inner.lock();
        let before = inner.frames.len();
        inner.frames.retain(|queued| match &queued.position {
            Some(tag) => !matches!(covered(&tag.responder_id), Some(ts) if tag.timestamp <= ts),
            None => true,
        });
        before - inner.frames.len()
    }

    /// Wait for the next frame. Returns `None` once the queue is closed and
    /// drained.
    pub async fn recv(&self) -> Option<Frame> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(frame) = inner.bootstrap.pop_front() {
                    return Some(frame);
                }
                if let Some(queued) = inner.frames.pop_front() {
                    return Some(queued.frame);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting frames and wake the receiver.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.bootstrap.len() + inner.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames evicted by overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
