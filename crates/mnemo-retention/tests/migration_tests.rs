//! Integration tests for migration failure handling and concurrency
//!
//! Tests that failed or hung store calls leave items where they were, that
//! the next pass retries them, and that accesses racing passes keep the
//! engine's bookkeeping consistent.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use mnemo_retention::clock::ManualClock;
use mnemo_retention::config::Config;
use mnemo_retention::error::{MigrationError, RetentionError};
use mnemo_retention::memory::types::{ItemId, StorageTier};
use mnemo_retention::optimizer::RunStatus;
use mnemo_retention::testing::{FlakyStore, ScriptedSignals};
use mnemo_retention::{Placement, RetentionEngine};

struct Setup {
    engine: Arc<RetentionEngine>,
    clock: ManualClock,
    signals: Arc<ScriptedSignals>,
    store: Arc<FlakyStore>,
}

fn setup_with(config: Config) -> Setup {
    let clock = ManualClock::starting_now();
    let signals = Arc::new(ScriptedSignals::new());
    let store = Arc::new(FlakyStore::new());
    let engine = RetentionEngine::with_clock(
        config,
        signals.clone(),
        store.clone(),
        Arc::new(clock.clone()),
    )
    .expect("valid config");

    Setup {
        engine: Arc::new(engine),
        clock,
        signals,
        store,
    }
}

fn setup() -> Setup {
    let mut config = Config::default();
    config.migration.store_timeout_ms = 50;
    config.optimizer.signal_timeout_ms = 50;
    setup_with(config)
}

impl Setup {
    async fn add(&self, owner: &str, relevance: f64, emotional_weight: f64) -> Placement {
        self.engine
            .classify_new_item(relevance, emotional_weight, owner, "conv")
            .await
            .expect("placement")
    }

    fn tier(&self, id: ItemId) -> StorageTier {
        self.engine.get_item(id).unwrap().item.tier
    }

    /// Index tier counts must match the capacity counters once idle
    fn assert_counts_consistent(&self) {
        let core = self.engine.core();
        let indexed = core.index.tier_counts(None);
        for tier in StorageTier::ALL {
            assert_eq!(
                core.capacity.current_count(tier),
                indexed[&tier],
                "capacity counter for {tier} drifted from the index"
            );
            if let Some(max) = core.capacity.max_capacity(tier) {
                assert!(core.capacity.current_count(tier) <= max);
            }
        }
    }
}

// =============================================================================
// Rollback
// =============================================================================

mod rollback {
    use super::*;

    #[tokio::test]
    async fn test_failed_move_leaves_item_in_place_and_retries_next_pass() {
        let s = setup();
        let id = s.add("u1", 1.0, 1.0).await.item_id;
        s.signals.set(id, 0.1, 0.1);
        s.store.set_fail_moves(true);

        let report = s.engine.run_optimization_pass(None).await.unwrap();
        assert_eq!(report.migrations_failed, 1);
        assert_eq!(s.tier(id), StorageTier::Hot);
        assert_eq!(s.store.inner().tier_of(id), Some(StorageTier::Hot));
        s.assert_counts_consistent();

        let metrics = s.engine.get_metrics();
        assert_eq!(metrics.rollbacks, 1);
        assert_eq!(metrics.migrations_failed, 1);

        s.store.set_fail_moves(false);
        let report = s.engine.run_optimization_pass(None).await.unwrap();
        assert_eq!(report.migrations_performed, 1);
        assert_eq!(s.tier(id), StorageTier::Cold);
        assert_eq!(s.store.inner().tier_of(id), Some(StorageTier::Cold));
        s.assert_counts_consistent();
    }

    #[tokio::test]
    async fn test_hung_move_times_out_and_rolls_back() {
        let s = setup();
        let id = s.add("u1", 1.0, 1.0).await.item_id;
        s.signals.set(id, 0.1, 0.1);
        s.store.set_hang_moves(true);

        let report = s.engine.run_optimization_pass(None).await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.migrations_failed, 1);
        assert_eq!(s.tier(id), StorageTier::Hot);
        s.assert_counts_consistent();
    }

    #[tokio::test]
    async fn test_store_rejecting_new_item_reserves_nothing() {
        let s = setup();
        s.store.set_fail_stores(true);

        let err = s.engine.classify_new_item(1.0, 1.0, "u1", "conv").await;
        assert!(matches!(
            err,
            Err(RetentionError::Migration(MigrationError::Store(_)))
        ));

        assert_eq!(s.engine.core().capacity.current_count(StorageTier::Hot), 0);
        assert!(s.engine.core().index.is_empty());
        assert!(s.engine.core().tracker.is_empty());
    }
}

// =============================================================================
// Classifier outages
// =============================================================================

mod classifier {
    use super::*;

    #[tokio::test]
    async fn test_slow_classifier_falls_back_to_cached_signals() {
        let s = setup();
        let id = s.add("u1", 1.0, 1.0).await.item_id;
        s.signals.set(id, 0.1, 0.1);
        s.signals.set_delay(StdDuration::from_millis(500));

        let report = s.engine.run_optimization_pass(None).await.unwrap();

        assert_eq!(report.stale_scores, 1);
        assert_eq!(report.migrations_performed, 0);
        let item = s.engine.get_item(id).unwrap();
        assert!(item.stale_score);
        assert_eq!(item.relevance, 1.0);
    }

    #[tokio::test]
    async fn test_stale_items_are_rescored_first() {
        let s = setup();
        let first = s.add("u1", 0.8, 0.8).await.item_id;
        let second = s.add("u1", 0.8, 0.8).await.item_id;

        s.signals.set_unavailable(true);
        s.engine.run_optimization_pass(None).await.unwrap();
        assert!(s.engine.get_item(first).unwrap().stale_score);
        assert!(s.engine.get_item(second).unwrap().stale_score);

        s.signals.set_unavailable(false);
        s.signals.set(first, 0.8, 0.8);
        s.signals.set(second, 0.8, 0.8);
        let report = s.engine.run_optimization_pass(None).await.unwrap();
        assert_eq!(report.stale_scores, 0);
        assert!(!s.engine.get_item(first).unwrap().stale_score);
        assert!(!s.engine.get_item(second).unwrap().stale_score);
    }
}

// =============================================================================
// Concurrency
// =============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_accesses_race_passes_without_losing_counts() {
        let mut config = Config::default();
        config.tiers.hot_capacity = 5;
        config.tiers.warm_capacity = 10;
        let s = setup_with(config);

        let mut ids = Vec::new();
        for i in 0..20 {
            let level = f64::from(i) / 19.0;
            let id = s.add("u1", level, level).await.item_id;
            s.signals.set(id, 1.0 - level, 1.0 - level);
            ids.push(id);
        }
        let ids = Arc::new(ids);
        s.clock.advance(Duration::days(8));

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let engine = Arc::clone(&s.engine);
            let ids = Arc::clone(&ids);
            tasks.push(tokio::spawn(async move {
                for n in 0..50 {
                    let id = ids[(worker * 7 + n) % ids.len()];
                    engine.record_access(id, 5.0, n % 3 != 0).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for _ in 0..3 {
            let engine = Arc::clone(&s.engine);
            tasks.push(tokio::spawn(async move {
                engine.run_optimization_pass(None).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let total: u64 = ids
            .iter()
            .map(|id| s.engine.get_item(*id).unwrap().item.access_count)
            .sum();
        assert_eq!(total, 400);
        s.assert_counts_consistent();

        let metrics = s.engine.get_metrics();
        assert_eq!(metrics.total_items, 20);
        assert_eq!(metrics.passes_run + metrics.passes_skipped, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accesses_to_one_item_agree_with_tracker() {
        let s = setup_with(Config::default());
        let id = s.add("u1", 0.5, 0.5).await.item_id;

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&s.engine);
            let clock = s.clock.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    clock.advance(Duration::seconds(1));
                    engine.record_access(id, 2.0, true).unwrap();
                    tokio::task::yield_now().await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let item = s.engine.get_item(id).unwrap().item;
        let record = s.engine.core().tracker.get_stats(id).unwrap();
        assert_eq!(item.access_count, 400);
        assert_eq!(record.access_count, 400);
        assert_eq!(item.last_accessed_at, record.last_accessed_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_placements_respect_capacity() {
        let mut config = Config::default();
        config.tiers.hot_capacity = 10;
        config.tiers.warm_capacity = 10;
        let s = setup_with(config);

        let mut tasks = Vec::new();
        for i in 0..60 {
            let engine = Arc::clone(&s.engine);
            tasks.push(tokio::spawn(async move {
                engine
                    .classify_new_item(1.0, 1.0, &format!("owner-{}", i % 4), "conv")
                    .await
                    .unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let core = s.engine.core();
        assert!(core.capacity.current_count(StorageTier::Hot) <= 10);
        assert!(core.capacity.current_count(StorageTier::Warm) <= 10);
        assert_eq!(core.index.len(), 60);
        s.assert_counts_consistent();
    }

    #[tokio::test]
    async fn test_untrack_frees_slot_for_next_item() {
        let mut config = Config::default();
        config.tiers.hot_capacity = 1;
        let s = setup_with(config);

        let first = s.add("u1", 1.0, 1.0).await;
        assert_eq!(first.tier, StorageTier::Hot);
        s.engine.protect(first.item_id, "keep").unwrap();

        let blocked = s.add("u1", 1.0, 1.0).await;
        assert_eq!(blocked.tier, StorageTier::Warm);

        s.engine.untrack_item(first.item_id).unwrap();
        assert!(!s.engine.is_protected(first.item_id));
        assert!(s.engine.get_item(first.item_id).is_err());

        let next = s.add("u1", 1.0, 1.0).await;
        assert_eq!(next.tier, StorageTier::Hot);
        s.assert_counts_consistent();
    }
}
