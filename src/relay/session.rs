//! Relay Session

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Byte accounting for one client-to-destination relay
#[derive(Debug)]
pub struct RelaySession {
    pub client_addr: SocketAddr,
    pub target: String,
    pub start_time: Instant,
    bytes_up: AtomicU64,
    bytes_down: AtomicU64,
}

impl RelaySession {
    pub fn new(client_addr: SocketAddr, target: impl Into<String>) -> Self {
        let target = target.into();
        debug!("piping {} <-> {}", client_addr, target);

        Self {
            client_addr,
            target,
            start_time: Instant::now(),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
        }
    }

    /// Bytes forwarded client to destination
    pub fn bytes_up(&self) -> u64 {
        self.bytes_up.load(Ordering::Relaxed)
    }

    /// Bytes forwarded destination to client
    pub fn bytes_down(&self) -> u64 {
        self.bytes_down.load(Ordering::Relaxed)
    }

    /// Bytes forwarded in both directions
    pub fn total_bytes(&self) -> u64 {
        self.bytes_up() + self.bytes_down()
    }

    /// Time since the session was created
    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Record bytes forwarded client to destination
    pub fn add_bytes_up(&self, bytes: u64) {
        self.bytes_up.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record bytes forwarded destination to client
    pub fn add_bytes_down(&self, bytes: u64) {
        self.bytes_down.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Log the final counters once the relay has ended
    pub fn log_stats(&self) {
        info!(
            client_addr = %self.client_addr,
            target = %self.target,
            duration_ms = self.duration().as_millis() as u64,
            bytes_up = self.bytes_up(),
            bytes_down = self.bytes_down(),
            total_bytes = self.total_bytes(),
            "closed pipe"
        );
    }
}
