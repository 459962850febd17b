//! Engine statistics tracking
//!
//! Atomic counters at two granularities: per connection (bytes and packets
//! moved on one socket) and per host (connection lifecycle totals).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic per-connection statistics
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Payload bytes handed to the OS
    bytes_sent: AtomicU64,
    /// Bytes read from the socket
    bytes_received: AtomicU64,
    /// Packets fully sent
    packets_sent: AtomicU64,
    /// Packets failed (teardown or I/O error)
    packets_failed: AtomicU64,
}

impl ConnectionStats {
    /// Create new connection statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes handed to the OS
    pub(crate) fn record_bytes_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Record bytes read from the socket
    pub(crate) fn record_bytes_received(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    /// Record a fully sent packet
    pub(crate) fn record_packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed packet
    pub(crate) fn record_packet_failed(&self) {
        self.packets_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get bytes handed to the OS
    #[must_use]
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Get bytes read from the socket
    #[must_use]
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Get packets fully sent
    #[must_use]
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Get packets failed
    #[must_use]
    pub fn packets_failed(&self) -> u64 {
        self.packets_failed.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
            packets_sent: self.packets_sent(),
            packets_failed: self.packets_failed(),
        }
    }
}

/// Snapshot of per-connection statistics at a point in time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConnectionStatsSnapshot {
    /// Payload bytes handed to the OS
    pub bytes_sent: u64,
    /// Bytes read from the socket
    pub bytes_received: u64,
    /// Packets fully sent
    pub packets_sent: u64,
    /// Packets failed
    pub packets_failed: u64,
}

impl ConnectionStatsSnapshot {
    /// Total bytes moved in both directions
    #[must_use]
    pub const fn total_bytes(&self) -> u64 {
        self.bytes_sent + self.bytes_received
    }
}

/// Atomic host-level statistics
#[derive(Debug, Default)]
pub struct HostStats {
    /// Connections registered over the host's lifetime
    opened: AtomicU64,
    /// Registered connections that have since disconnected
    closed: AtomicU64,
}

impl HostStats {
    /// Create new host statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registered connection
    pub(crate) fn record_opened(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a disconnected connection
    pub(crate) fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get connections registered over the host's lifetime
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Get registered connections that have since disconnected
    #[must_use]
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Get currently live registered connections
    #[must_use]
    pub fn active(&self) -> u64 {
        self.opened().saturating_sub(self.closed())
    }

    /// Get a snapshot of all counters
    #[must_use]
    pub fn snapshot(&self) -> HostStatsSnapshot {
        HostStatsSnapshot {
            opened: self.opened(),
            closed: self.closed(),
            active: self.active(),
        }
    }
}

/// Snapshot of host statistics at a point in time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HostStatsSnapshot {
    /// Connections registered over the host's lifetime
    pub opened: u64,
    /// Registered connections that have since disconnected
    pub closed: u64,
    /// Currently live registered connections
    pub active: u64,
}
