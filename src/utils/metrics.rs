//! Observability and Metrics
//!
//! Per-role counters for monitoring transport health. Every client, server,
//! peer and relay owns one [`Metrics`] instance and exposes it read-only.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector for one transport role
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Outbound connect attempts (stream client)
    pub connect_attempts: AtomicU64,
    /// Frames handed to the socket
    pub frames_sent: AtomicU64,
    /// Frames read from the socket
    pub frames_received: AtomicU64,
    /// Total bytes sent, headers included
    pub bytes_sent: AtomicU64,
    /// Total bytes received, headers included
    pub bytes_received: AtomicU64,
    /// Frames of unregistered types dropped without notice
    pub frames_dropped: AtomicU64,
    /// Well-framed payloads that failed to decrypt or parse
    pub decode_failures: AtomicU64,
    /// Payloads encrypted
    pub encryption_total: AtomicU64,
    /// Socket-level errors
    pub io_errors: AtomicU64,
    /// Datagrams forwarded by a relay
    pub frames_forwarded: AtomicU64,
    /// Datagrams a relay discarded to simulate loss
    pub frames_lost: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            encryption_total: AtomicU64::new(0),
            io_errors: AtomicU64::new(0),
            frames_forwarded: AtomicU64::new(0),
            frames_lost: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame written to the socket
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a frame read from the socket
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encryption(&self) {
        self.encryption_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_forwarded(&self) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_lost(&self) {
        self.frames_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            encryption_total: self.encryption_total.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_lost: self.frames_lost.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self, role: &str) {
        let snapshot = self.snapshot();
        info!(
            role,
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connect_attempts = snapshot.connect_attempts,
            frames_sent = snapshot.frames_sent,
            frames_received = snapshot.frames_received,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            frames_dropped = snapshot.frames_dropped,
            decode_failures = snapshot.decode_failures,
            encryption_total = snapshot.encryption_total,
            io_errors = snapshot.io_errors,
            frames_forwarded = snapshot.frames_forwarded,
            frames_lost = snapshot.frames_lost,
            uptime_seconds = snapshot.uptime_seconds,
            "Transport metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connect_attempts: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_dropped: u64,
    pub decode_failures: u64,
    pub encryption_total: u64,
    pub io_errors: u64,
    pub frames_forwarded: u64,
    pub frames_lost: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_accounting() {
        let m = Metrics::new();
        m.connection_established();
        m.connection_established();
        m.connection_closed();
        let s = m.snapshot();
        assert_eq!(s.connections_total, 2);
        assert_eq!(s.connections_active, 1);
    }

    #[test]
    fn test_frame_counters() {
        let m = Metrics::default();
        m.frame_sent(12);
        m.frame_received(20);
        m.frame_received(8);
        m.frame_dropped();
        let s = m.snapshot();
        assert_eq!((s.frames_sent, s.bytes_sent), (1, 12));
        assert_eq!((s.frames_received, s.bytes_received), (2, 28));
        assert_eq!(s.frames_dropped, 1);
    }
}
