//! Engine metrics
//!
//! Lock-free counters bumped by every component, plus the last pass report.
//! Tier counts come from the item index at snapshot time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::memory::types::StorageTier;
use crate::optimizer::{OptimizationRunReport, RunStatus};

/// Point-in-time view of engine metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_items: usize,
    pub per_tier_counts: BTreeMap<StorageTier, usize>,
    /// Hits over all recorded accesses; 0 before the first access
    pub cache_hit_rate: f64,
    /// Mean latency over all recorded accesses; 0 before the first access
    pub avg_retrieval_latency_ms: f64,
    pub passes_run: u64,
    pub passes_failed: u64,
    pub passes_skipped: u64,
    pub items_examined: u64,
    pub migrations_performed: u64,
    pub migrations_failed: u64,
    pub rollbacks: u64,
    pub capacity_fallbacks: u64,
    pub classifier_unavailable: u64,
    pub last_pass: Option<OptimizationRunReport>,
}

/// Aggregates counters across the engine
#[derive(Debug, Default)]
pub struct MetricsReporter {
    accesses: AtomicU64,
    hits: AtomicU64,
    latency_samples: AtomicU64,
    /// Sum of latencies in microseconds
    latency_total_us: AtomicU64,
    passes_run: AtomicU64,
    passes_failed: AtomicU64,
    passes_skipped: AtomicU64,
    items_examined: AtomicU64,
    migrations_performed: AtomicU64,
    migrations_failed: AtomicU64,
    rollbacks: AtomicU64,
    capacity_fallbacks: AtomicU64,
    classifier_unavailable: AtomicU64,
    last_pass: Mutex<Option<OptimizationRunReport>>,
}

impl MetricsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_access(&self, latency_ms: f64, was_hit: bool) {
        self.accesses.fetch_add(1, Ordering::Relaxed);
        if was_hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            self.latency_samples.fetch_add(1, Ordering::Relaxed);
            self.latency_total_us
                .fetch_add((latency_ms * 1000.0).round() as u64, Ordering::Relaxed);
        }
    }

    pub fn record_migration(&self) {
        self.migrations_performed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_migration_failure(&self) {
        self.migrations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capacity_fallback(&self) {
        self.capacity_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_unavailable(&self) {
        self.classifier_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass_skipped(&self) {
        self.passes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a finished pass into the totals and keep it as the last pass
    pub fn record_pass(&self, report: &OptimizationRunReport) {
        match report.status {
            RunStatus::AlreadyRunning => {
                self.record_pass_skipped();
                return;
            }
            RunStatus::Failed { .. } => {
                self.passes_failed.fetch_add(1, Ordering::Relaxed);
            }
            RunStatus::Completed | RunStatus::Cancelled => {}
        }
        self.passes_run.fetch_add(1, Ordering::Relaxed);
        self.items_examined
            .fetch_add(report.items_examined as u64, Ordering::Relaxed);
        *self.last_pass.lock() = Some(report.clone());
    }

    pub fn passes_run(&self) -> u64 {
        self.passes_run.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, per_tier_counts: BTreeMap<StorageTier, usize>) -> MetricsSnapshot {
        let accesses = self.accesses.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let latency_total_us = self.latency_total_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_items: per_tier_counts.values().sum(),
            per_tier_counts,
            cache_hit_rate: if accesses == 0 {
                0.0
            } else {
                hits as f64 / accesses as f64
            },
            avg_retrieval_latency_ms: if samples == 0 {
                0.0
            } else {
                latency_total_us as f64 / samples as f64 / 1000.0
            },
            passes_run: self.passes_run.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            items_examined: self.items_examined.load(Ordering::Relaxed),
            migrations_performed: self.migrations_performed.load(Ordering::Relaxed),
            migrations_failed: self.migrations_failed.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            capacity_fallbacks: self.capacity_fallbacks.load(Ordering::Relaxed),
            classifier_unavailable: self.classifier_unavailable.load(Ordering::Relaxed),
            last_pass: self.last_pass.lock().clone(),
        }
    }
}
