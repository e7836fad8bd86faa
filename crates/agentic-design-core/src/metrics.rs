//! Lock-free metrics primitives + a small global metrics surface.
//!
//! Design goals:
//! - Hot-path recording: O(1), no allocations, no locks.
//! - Snapshotting: lock-free loads, serializable for the doctor report.
//!
//! This is intentionally lightweight (std-only) so all crates can record
//! metrics without a registry dependency.

#![forbid(unsafe_code)]

use serde::Serialize;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Counter {
    v: AtomicU64,
}

impl Counter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(&self) {
        self.v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct GaugeI64 {
    v: AtomicI64,
}

impl GaugeI64 {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            v: AtomicI64::new(0),
        }
    }

    #[inline]
    pub fn add(&self, delta: i64) {
        self.v.fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, value: i64) {
        self.v.store(value, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> i64 {
        self.v.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Global metrics
// ---------------------------------------------------------------------------

/// Process-wide pipeline metrics. One instance, atomic fields only.
#[derive(Debug, Default)]
pub struct GlobalMetrics {
    // Enhancement path
    pub enhance_requests: Counter,
    pub transforms_run: Counter,
    pub edits_applied: Counter,
    pub edits_advisory: Counter,
    pub guardrail_demotions: Counter,

    // Cache
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_store_failures: Counter,
    pub coalesce_leaders: Counter,
    pub coalesce_joiners: Counter,

    // Visual loop
    pub captures_total: Counter,
    pub capture_timeouts: Counter,
    pub capture_backpressure: Counter,
    pub capture_queue_depth: GaugeI64,
    pub vision_calls: Counter,
    pub vision_retries: Counter,
    pub vision_failures: Counter,
    pub screenshots_cleaned: Counter,

    // Patterns
    pub pattern_observations: Counter,
    pub pattern_suggestions: Counter,

    // Degradation
    pub degraded_transitions: Counter,
}

static GLOBAL: LazyLock<GlobalMetrics> = LazyLock::new(GlobalMetrics::default);

/// The process-wide metrics instance.
#[must_use]
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL
}

/// Serializable point-in-time view of [`GlobalMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub enhance_requests: u64,
    pub transforms_run: u64,
    pub edits_applied: u64,
    pub edits_advisory: u64,
    pub guardrail_demotions: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate_pct: u64,
    pub cache_store_failures: u64,
    pub coalesce_leaders: u64,
    pub coalesce_joiners: u64,
    pub captures_total: u64,
    pub capture_timeouts: u64,
    pub capture_backpressure: u64,
    pub capture_queue_depth: i64,
    pub vision_calls: u64,
    pub vision_retries: u64,
    pub vision_failures: u64,
    pub screenshots_cleaned: u64,
    pub pattern_observations: u64,
    pub pattern_suggestions: u64,
    pub degraded_transitions: u64,
}

impl GlobalMetrics {
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.cache_hits.load();
        let misses = self.cache_misses.load();
        let total = hits + misses;
        MetricsSnapshot {
            enhance_requests: self.enhance_requests.load(),
            transforms_run: self.transforms_run.load(),
            edits_applied: self.edits_applied.load(),
            edits_advisory: self.edits_advisory.load(),
            guardrail_demotions: self.guardrail_demotions.load(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate_pct: if total == 0 { 0 } else { hits * 100 / total },
            cache_store_failures: self.cache_store_failures.load(),
            coalesce_leaders: self.coalesce_leaders.load(),
            coalesce_joiners: self.coalesce_joiners.load(),
            captures_total: self.captures_total.load(),
            capture_timeouts: self.capture_timeouts.load(),
            capture_backpressure: self.capture_backpressure.load(),
            capture_queue_depth: self.capture_queue_depth.load(),
            vision_calls: self.vision_calls.load(),
            vision_retries: self.vision_retries.load(),
            vision_failures: self.vision_failures.load(),
            screenshots_cleaned: self.screenshots_cleaned.load(),
            pattern_observations: self.pattern_observations.load(),
            pattern_suggestions: self.pattern_suggestions.load(),
            degraded_transitions: self.degraded_transitions.load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = GlobalMetrics::default();
        m.cache_hits.inc();
        m.cache_hits.add(2);
        m.cache_misses.inc();
        let snap = m.snapshot();
        assert_eq!(snap.cache_hits, 3);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.cache_hit_rate_pct, 75);
    }

    #[test]
    fn hit_rate_handles_zero_traffic() {
        let m = GlobalMetrics::default();
        assert_eq!(m.snapshot().cache_hit_rate_pct, 0);
    }

    #[test]
    fn gauge_tracks_depth() {
        let m = GlobalMetrics::default();
        m.capture_queue_depth.add(3);
        m.capture_queue_depth.add(-1);
        assert_eq!(m.snapshot().capture_queue_depth, 2);
    }
}
