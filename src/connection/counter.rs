//! Approximate active-connection counter
//!
//! Only feeds a periodic log line. The check-then-advance on the log threshold
//! is not atomic as a whole, so a line can be skipped or repeated under load.

use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

/// Log once every this many connections
pub const LOG_CNT_DELTA: i64 = 100;

#[derive(Debug)]
pub struct ConnectionCounter {
    active: AtomicI64,
    next_log: AtomicI64,
}

impl ConnectionCounter {
    pub fn new() -> Self {
        Self {
            active: AtomicI64::new(0),
            next_log: AtomicI64::new(LOG_CNT_DELTA),
        }
    }

    /// Count a newly accepted connection until the returned guard drops
    pub fn track(&self) -> ConnectionGuard<'_> {
        let count = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= self.next_log.load(Ordering::Relaxed) {
            info!("Number of client connections reaches {}", count);
            self.next_log.fetch_add(LOG_CNT_DELTA, Ordering::Relaxed);
        }
        ConnectionGuard { counter: self }
    }

    /// Connections currently open
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Count at which the next log line is due
    pub fn next_log_at(&self) -> i64 {
        self.next_log.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the counter exactly once, on drop
#[derive(Debug)]
pub struct ConnectionGuard<'a> {
    counter: &'a ConnectionCounter,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.counter.active.fetch_sub(1, Ordering::Relaxed);
    }
}
