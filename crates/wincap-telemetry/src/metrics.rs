//! Shared, cross-thread counters for the Frame Queue (C1) and Capture Engine (C3).
//!
//! The producer thread (capture callback) and consumer thread (caller of
//! `pop_batch`) both hold a clone of [`CaptureMetrics`]; every field is an
//! independent atomic so readers never block writers.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// A point-in-time read of [`CaptureMetrics`], returned by `metrics()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub errors: u64,
    pub current_size: u32,
    pub last_error: Option<String>,
}

/// Shared counters for one Frame Queue instance.
#[derive(Clone)]
pub struct CaptureMetrics {
    enqueued: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    current_size: Arc<AtomicU32>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self {
            enqueued: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            errors: Arc::new(AtomicU64::new(0)),
            current_size: Arc::new(AtomicU32::new(0)),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a sticky error kind. Per the capture engine's contract this
    /// stays set until `stop()` calls [`Self::clear_error`]; it is not reset
    /// by subsequent successful operations.
    pub fn record_error(&self, kind: impl Into<String>) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(kind.into());
    }

    pub fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    pub fn set_current_size(&self, size: u32) {
        self.current_size.store(size, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            current_size: self.current_size.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_are_all_zero() {
        let m = CaptureMetrics::new();
        let s = m.snapshot();
        assert_eq!(s.enqueued, 0);
        assert_eq!(s.dropped, 0);
        assert_eq!(s.errors, 0);
        assert_eq!(s.current_size, 0);
        assert!(s.last_error.is_none());
    }

    #[test]
    fn error_is_sticky_until_cleared() {
        let m = CaptureMetrics::new();
        m.record_error("endpoint_init_failed");
        assert_eq!(m.snapshot().last_error.as_deref(), Some("endpoint_init_failed"));
        m.clear_error();
        assert!(m.snapshot().last_error.is_none());
    }

    #[test]
    fn counters_accumulate_across_clones() {
        let m = CaptureMetrics::new();
        let m2 = m.clone();
        m.record_enqueued();
        m2.record_enqueued();
        m.record_dropped();
        assert_eq!(m.snapshot().enqueued, 2);
        assert_eq!(m2.snapshot().dropped, 1);
    }

    #[test]
    fn current_size_reflects_latest_store() {
        let m = CaptureMetrics::new();
        m.set_current_size(4);
        assert_eq!(m.snapshot().current_size, 4);
        m.set_current_size(0);
        assert_eq!(m.snapshot().current_size, 0);
    }
}
