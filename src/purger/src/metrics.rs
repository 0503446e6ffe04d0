//! Purge Metrics
//!
//! Thread-safe counters for monitoring purge operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe metrics for tracking purge operations
#[derive(Debug, Clone, Default)]
pub struct PurgeMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Purges that got past interval resolution
    purges_started: AtomicU64,
    /// Purges that matched no buckets
    purges_empty: AtomicU64,
    /// Purges that backed up and deleted their buckets
    purges_completed: AtomicU64,
    /// Purges aborted before anything was deleted
    purges_aborted: AtomicU64,
    /// Purges whose delete failed after a successful backup
    purges_partial: AtomicU64,
    buckets_backed_up: AtomicU64,
    buckets_deleted: AtomicU64,
    backup_bytes: AtomicU64,
    total_duration_ms: AtomicU64,
}

/// Point-in-time copy of [`PurgeMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeMetricsSnapshot {
    pub purges_started: u64,
    pub purges_empty: u64,
    pub purges_completed: u64,
    pub purges_aborted: u64,
    pub purges_partial: u64,
    pub buckets_backed_up: u64,
    pub buckets_deleted: u64,
    pub backup_bytes: u64,
    pub total_duration_ms: u64,
}

impl PurgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.inner.purges_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty(&self) {
        self.inner.purges_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.inner.purges_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aborted(&self) {
        self.inner.purges_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partial(&self) {
        self.inner.purges_partial.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a published backup of `buckets` buckets and `bytes` bytes
    pub fn record_backup(&self, buckets: u64, bytes: u64) {
        self.inner
            .buckets_backed_up
            .fetch_add(buckets, Ordering::Relaxed);
        self.inner.backup_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, buckets: u64) {
        self.inner
            .buckets_deleted
            .fetch_add(buckets, Ordering::Relaxed);
    }

    /// Record operation duration
    pub fn record_duration_ms(&self, duration_ms: u64) {
        self.inner
            .total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PurgeMetricsSnapshot {
        let inner = &self.inner;
        PurgeMetricsSnapshot {
            purges_started: inner.purges_started.load(Ordering::Relaxed),
            purges_empty: inner.purges_empty.load(Ordering::Relaxed),
            purges_completed: inner.purges_completed.load(Ordering::Relaxed),
            purges_aborted: inner.purges_aborted.load(Ordering::Relaxed),
            purges_partial: inner.purges_partial.load(Ordering::Relaxed),
            buckets_backed_up: inner.buckets_backed_up.load(Ordering::Relaxed),
            buckets_deleted: inner.buckets_deleted.load(Ordering::Relaxed),
            backup_bytes: inner.backup_bytes.load(Ordering::Relaxed),
            total_duration_ms: inner.total_duration_ms.load(Ordering::Relaxed),
        }
    }
}
