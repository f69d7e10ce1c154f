use chrono::Utc;
use parking_lot::Mutex;

/// Server-side receipt clock.
///
/// Hands out Unix-millisecond timestamps that are strictly increasing across
/// all callers, even when several stamps land in the same millisecond or the
/// wall clock steps backwards. Two updates stamped by the same clock can
/// therefore always be ordered.
pub struct ReceiptClock {
    last_ms: Mutex<i64>,
}

impl ReceiptClock {
    pub fn new() -> Self {
        Self {
            last_ms: Mutex::new(0),
        }
    }

    /// Stamp a receipt.
    pub fn stamp(&self) -> i64 {
        self.stamp_at(Utc::now().timestamp_millis())
    }

    /// Stamp a receipt observed at `now_ms`. If `now_ms` is not ahead of the
    /// previous stamp, the previous stamp plus one is returned instead.
    pub fn stamp_at(&self, now_ms: i64) -> i64 {
        let mut last = self.last_ms.lock();
        let next = if now_ms > *last { now_ms } else { *last + 1 };
        *last = next;
        next
    }

    /// The most recent stamp handed out (0 if none).
    pub fn last(&self) -> i64 {
        *self.last_ms.lock()
    }
}

impl Default for ReceiptClock {
    fn default() -> Self {
        Self::new()
    }
}
