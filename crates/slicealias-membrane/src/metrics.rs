//! Atomic counters for monitor observability.
//!
//! All counters use relaxed ordering. They are diagnostic, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-context monitor counters.
#[derive(Debug)]
pub struct MonitorMetrics {
    /// Non-empty ranges checksummed at alias time.
    pub views_monitored: AtomicU64,
    /// Alias operations that skipped monitoring (disabled or empty).
    pub views_skipped: AtomicU64,
    /// Checksum computations of any kind.
    pub checksums: AtomicU64,
    /// Probe threads started.
    pub probes_spawned: AtomicU64,
    /// Deferred checks captured by a closed gate.
    pub deferred_captured: AtomicU64,
    /// Deferred rechecks run by a sweep.
    pub rechecks: AtomicU64,
    /// Mismatches reported to the violation handler.
    pub violations: AtomicU64,
}

impl MonitorMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            views_monitored: AtomicU64::new(0),
            views_skipped: AtomicU64::new(0),
            checksums: AtomicU64::new(0),
            probes_spawned: AtomicU64::new(0),
            deferred_captured: AtomicU64::new(0),
            rechecks: AtomicU64::new(0),
            violations: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters. Pool counters come from the hash provider.
    #[must_use]
    pub fn snapshot(&self, pool_hits: u64, pool_misses: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            views_monitored: Self::get(&self.views_monitored),
            views_skipped: Self::get(&self.views_skipped),
            checksums: Self::get(&self.checksums),
            probes_spawned: Self::get(&self.probes_spawned),
            deferred_captured: Self::get(&self.deferred_captured),
            rechecks: Self::get(&self.rechecks),
            violations: Self::get(&self.violations),
            pool_hits,
            pool_misses,
        }
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all monitor counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub views_monitored: u64,
    pub views_skipped: u64,
    pub checksums: u64,
    pub probes_spawned: u64,
    pub deferred_captured: u64,
    pub rechecks: u64,
    pub violations: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
}
