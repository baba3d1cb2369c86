//! Coalescing doorbell for a parked consumer.
//!
//! Producers ring after a successful push; the consumer parks when every
//! queue it drains came up empty. Multiple rings before a wait collapse
//! into a single wake, and a ring that races a consumer heading into
//! `wait` is never lost.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct SignalInner {
    pending: Mutex<bool>,
    cond: Condvar,
}

/// Shared wait/wake primitive. Cheap to clone; all clones observe the same
/// doorbell.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                pending: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Rings the doorbell. Wakes the waiter if one is parked, otherwise the
    /// next `wait` returns immediately.
    pub fn notify(&self) {
        let mut pending = self.inner.pending.lock();
        *pending = true;
        self.inner.cond.notify_one();
    }

    /// Parks until notified or until `timeout` elapses. Returns true when a
    /// notification was consumed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut pending = self.inner.pending.lock();
        if !*pending {
            self.inner.cond.wait_for(&mut pending, timeout);
        }
        std::mem::take(&mut *pending)
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}
