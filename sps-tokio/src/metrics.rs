//! Process-wide metrics for SPS link sessions

use sps_core::LinkStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Global metrics collector
#[derive(Debug)]
pub struct GlobalMetrics {
    /// Total sessions opened
    pub sessions_opened: AtomicU64,
    /// Sessions currently live
    pub active_sessions: AtomicUsize,
    /// Total payload bytes sent across all sessions
    pub total_bytes_sent: AtomicU64,
    /// Total payload bytes received across all sessions
    pub total_bytes_received: AtomicU64,
    /// Total data frames sent
    pub total_frames_sent: AtomicU64,
    /// Total data frames received
    pub total_frames_received: AtomicU64,
    /// Credit grant messages written to peers
    pub total_grants_issued: AtomicU64,
    /// Credit grant messages received from peers
    pub total_grants_received: AtomicU64,
    /// Sessions torn down by the peer's disconnect sentinel
    pub sentinel_disconnects: AtomicU64,
    /// Sends rejected locally for lack of outbound credit
    pub credit_rejections: AtomicU64,
    /// Replenishment grant writes that failed at the transport
    pub grant_write_failures: AtomicU64,
}

impl Default for GlobalMetrics {
    fn default() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            active_sessions: AtomicUsize::new(0),
            total_bytes_sent: AtomicU64::new(0),
            total_bytes_received: AtomicU64::new(0),
            total_frames_sent: AtomicU64::new(0),
            total_frames_received: AtomicU64::new(0),
            total_grants_issued: AtomicU64::new(0),
            total_grants_received: AtomicU64::new(0),
            sentinel_disconnects: AtomicU64::new(0),
            credit_rejections: AtomicU64::new(0),
            grant_write_failures: AtomicU64::new(0),
        }
    }
}

impl GlobalMetrics {
    /// Record a new session
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session teardown, folding its final stats into the totals
    /// (accumulates, not overwrites).
    pub fn session_closed(&self, stats: &LinkStats) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.total_bytes_sent
            .fetch_add(stats.bytes_sent, Ordering::Relaxed);
        self.total_bytes_received
            .fetch_add(stats.bytes_received, Ordering::Relaxed);
        self.total_frames_sent
            .fetch_add(stats.frames_sent, Ordering::Relaxed);
        self.total_frames_received
            .fetch_add(stats.frames_received, Ordering::Relaxed);
        self.total_grants_issued
            .fetch_add(stats.grants_issued, Ordering::Relaxed);
        self.total_grants_received
            .fetch_add(stats.grants_received, Ordering::Relaxed);
    }

    pub fn sentinel_disconnect(&self) {
        self.sentinel_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn credit_rejection(&self) {
        self.credit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn grant_write_failure(&self) {
        self.grant_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
            total_frames_sent: self.total_frames_sent.load(Ordering::Relaxed),
            total_frames_received: self.total_frames_received.load(Ordering::Relaxed),
            total_grants_issued: self.total_grants_issued.load(Ordering::Relaxed),
            total_grants_received: self.total_grants_received.load(Ordering::Relaxed),
            sentinel_disconnects: self.sentinel_disconnects.load(Ordering::Relaxed),
            credit_rejections: self.credit_rejections.load(Ordering::Relaxed),
            grant_write_failures: self.grant_write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub active_sessions: usize,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub total_frames_sent: u64,
    pub total_frames_received: u64,
    pub total_grants_issued: u64,
    pub total_grants_received: u64,
    pub sentinel_disconnects: u64,
    pub credit_rejections: u64,
    pub grant_write_failures: u64,
}

impl MetricsSnapshot {
    /// Fraction of send attempts bounced for lack of credit
    pub fn rejection_rate(&self) -> f64 {
        let attempts = self.total_frames_sent + self.credit_rejections;
        if attempts == 0 {
            0.0
        } else {
            self.credit_rejections as f64 / attempts as f64
        }
    }
}

/// Global metrics instance
pub static GLOBAL_METRICS: std::sync::LazyLock<GlobalMetrics> =
    std::sync::LazyLock::new(GlobalMetrics::default);

/// Get global metrics
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

/// Format metrics for human-readable display
pub fn format_metrics(snapshot: &MetricsSnapshot) -> String {
    format!(
        "SPS Metrics:\n\
         Sessions: {} opened, {} active\n\
         Traffic: {} bytes sent, {} bytes received\n\
         Frames: {} sent, {} received\n\
         Grants: {} issued, {} received ({} write failures)\n\
         Credit rejections: {} (rate: {:.2}%)\n\
         Sentinel disconnects: {}",
        snapshot.sessions_opened,
        snapshot.active_sessions,
        snapshot.total_bytes_sent,
        snapshot.total_bytes_received,
        snapshot.total_frames_sent,
        snapshot.total_frames_received,
        snapshot.total_grants_issued,
        snapshot.total_grants_received,
        snapshot.grant_write_failures,
        snapshot.credit_rejections,
        snapshot.rejection_rate() * 100.0,
        snapshot.sentinel_disconnects,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_counters() {
        let metrics = GlobalMetrics::default();

        metrics.session_opened();
        assert_eq!(metrics.active_sessions.load(Ordering::Relaxed), 1);

        let stats = LinkStats {
            frames_sent: 3,
            bytes_sent: 12,
            ..Default::default()
        };
        metrics.session_closed(&stats);
        assert_eq!(metrics.active_sessions.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.total_frames_sent.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.total_bytes_sent.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn test_rejection_rate() {
        let metrics = GlobalMetrics::default();
        metrics.credit_rejection();
        metrics.total_frames_sent.store(3, Ordering::Relaxed);
        let snapshot = metrics.snapshot();
        assert!((snapshot.rejection_rate() - 0.25).abs() < 1e-9);
    }
}
