//! The retention engine
//!
//! [`RetentionEngine`] is the surface a host embeds. It owns the shared
//! [`EngineCore`], the [`TierOptimizer`] and, once started, the scheduler.
//!
//! Work that reserves capacity or moves items (placing a new item, running
//! a pass) runs on its own tokio task. A caller that gives up on the
//! returned future never leaves a reservation or migration half done.

pub mod core;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{RetentionError, Result};
use crate::memory::access::AccessRecord;
use crate::memory::index::{CachedSignals, ItemEntry};
use crate::memory::protection::ProtectionEntry;
use crate::memory::types::{ItemId, ItemSnapshot, StorageTier, TrackedItem};
use crate::memory::weight::clamp_unit;
use crate::metrics::MetricsSnapshot;
use crate::optimizer::{
    OptimizationRunReport, OptimizerSettings, OptimizerState, RunTrigger, SchedulerHandle,
    TierOptimizer,
};
use crate::signals::SignalSource;
use crate::storage::capacity::Admission;
use crate::storage::migration::TierStore;
use crate::storage::tiers::CAPACITY_CONSTRAINED;

pub use self::core::{EngineCore, Settlement};

/// Admission attempts before a new item is sent straight to Cold
const MAX_ADMIT_ATTEMPTS: usize = 3;

/// Where a new item was placed, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub item_id: ItemId,
    pub tier: StorageTier,
    pub score: f64,
    pub reason: String,
    pub capacity_constrained: bool,
}

pub struct RetentionEngine {
    config: Config,
    core: Arc<EngineCore>,
    optimizer: Arc<TierOptimizer>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl std::fmt::Debug for RetentionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionEngine")
            .field("items", &self.core.index.len())
            .field("optimizer", &self.optimizer)
            .finish()
    }
}

impl RetentionEngine {
    pub fn new(
        config: Config,
        signals: Arc<dyn SignalSource>,
        store: Arc<dyn TierStore>,
    ) -> Result<Self> {
        Self::with_clock(config, signals, store, Arc::new(SystemClock))
    }

    /// Build an engine reading time from `clock`
    pub fn with_clock(
        config: Config,
        signals: Arc<dyn SignalSource>,
        store: Arc<dyn TierStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let core = Arc::new(EngineCore::new(&config, signals, store, clock));
        let optimizer = Arc::new(TierOptimizer::new(
            Arc::clone(&core),
            OptimizerSettings {
                signal_timeout: config.optimizer.signal_timeout(),
                max_parallel_migrations: config.optimizer.max_parallel_migrations,
                max_consecutive_failures: config.optimizer.max_consecutive_failures,
            },
        ));

        tracing::info!(
            hot_capacity = config.tiers.hot_capacity,
            warm_capacity = config.tiers.warm_capacity,
            "Retention engine ready"
        );

        Ok(Self {
            config,
            core,
            optimizer,
            scheduler: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    /// Score and place a newly stored item, then hand it to the store
    pub async fn classify_new_item(
        &self,
        relevance: f64,
        emotional_weight: f64,
        owner_id: &str,
        context_id: &str,
    ) -> Result<Placement> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(RetentionError::InvalidInput(
                "owner_id must not be empty".to_string(),
            ));
        }
        // Out-of-range classifier output is clamped, NaN counts as zero
        let relevance = clamp_unit(relevance);
        let emotional_weight = clamp_unit(emotional_weight);

        let core = Arc::clone(&self.core);
        let item = TrackedItem::new(owner_id, context_id, StorageTier::Cold, 0.0, core.clock.now());
        let signals = CachedSignals {
            relevance,
            emotional_weight,
            fetched_at: item.created_at,
        };

        tokio::spawn(place_new_item(core, item, signals))
            .await
            .map_err(|e| RetentionError::Internal(format!("placement task failed: {e}")))?
    }

    /// Record one retrieval of an item
    ///
    /// Any access resets accumulated decay. The item's score never drops as
    /// a result.
    pub fn record_access(
        &self,
        item_id: ItemId,
        latency_ms: f64,
        was_hit: bool,
    ) -> Result<AccessRecord> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(RetentionError::InvalidInput(format!(
                "latency_ms must be a non-negative number, got {latency_ms}"
            )));
        }
        let slot = self
            .core
            .index
            .get(item_id)
            .ok_or(RetentionError::ItemNotFound(item_id))?;

        // Held across the tracker update: accesses land on the item in
        // tracker order
        let mut entry = slot.lock();
        let now = self.core.clock.now();
        let record = self
            .core
            .tracker
            .record_access(item_id, now, latency_ms, was_hit)
            .ok_or(RetentionError::ItemNotFound(item_id))?;
        self.core.metrics.record_access(latency_ms, was_hit);

        entry.item.access_count = record.access_count;
        entry.item.last_accessed_at = record.last_accessed_at;
        entry.decay_factor = 1.0;
        entry.last_decayed_at = None;
        let restored = entry.effective_score();
        if restored > entry.item.score {
            entry.item.score = restored;
        }

        Ok(record)
    }

    pub fn protect(&self, item_id: ItemId, reason: &str) -> Result<ProtectionEntry> {
        let slot = self
            .core
            .index
            .get(item_id)
            .ok_or(RetentionError::ItemNotFound(item_id))?;
        Ok(self
            .core
            .protection
            .protect(item_id, slot.owner_id(), reason, self.core.clock.now()))
    }

    /// Returns whether the item was protected
    pub fn unprotect(&self, item_id: ItemId) -> Result<bool> {
        if !self.core.index.contains(item_id) {
            return Err(RetentionError::ItemNotFound(item_id));
        }
        Ok(self.core.protection.unprotect(item_id).is_some())
    }

    pub fn is_protected(&self, item_id: ItemId) -> bool {
        self.core.protection.is_protected(item_id)
    }

    pub fn list_protected(&self, owner_id: &str) -> Vec<ItemId> {
        self.core.protection.list_protected(owner_id)
    }

    /// Run one optimization pass over `owner_id`'s items, or all items
    pub async fn run_optimization_pass(
        &self,
        owner_id: Option<&str>,
    ) -> Result<OptimizationRunReport> {
        let optimizer = Arc::clone(&self.optimizer);
        let owner = owner_id.map(str::to_string);
        tokio::spawn(async move { optimizer.run_pass(owner.as_deref(), RunTrigger::Manual).await })
            .await
            .map_err(|e| RetentionError::Internal(format!("optimization task failed: {e}")))
    }

    /// Item count per tier for one owner; every tier is present
    pub fn get_tier_distribution(&self, owner_id: &str) -> BTreeMap<StorageTier, usize> {
        self.core.index.tier_counts(Some(owner_id))
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.core.metrics.snapshot(self.core.index.tier_counts(None))
    }

    pub fn get_item(&self, item_id: ItemId) -> Result<ItemSnapshot> {
        let slot = self
            .core
            .index
            .get(item_id)
            .ok_or(RetentionError::ItemNotFound(item_id))?;
        let entry = slot.snapshot();
        let stats = self.core.tracker.get_stats(item_id);

        Ok(ItemSnapshot {
            protected: self.core.protection.is_protected(item_id),
            stale_score: entry.stale_score,
            relevance: entry.signals.relevance,
            emotional_weight: entry.signals.emotional_weight,
            access_frequency: stats.as_ref().map_or(0.0, |s| s.access_frequency),
            avg_retrieval_latency_ms: stats.as_ref().and_then(AccessRecord::average_latency_ms),
            hits: stats.as_ref().map_or(0, |s| s.hits),
            misses: stats.as_ref().map_or(0, |s| s.misses),
            item: entry.item,
        })
    }

    /// Stop tracking an item the caller deleted
    ///
    /// Frees its tier slot. The payload is left to the caller's store.
    pub fn untrack_item(&self, item_id: ItemId) -> Result<TrackedItem> {
        let slot = self
            .core
            .index
            .remove(item_id)
            .ok_or(RetentionError::ItemNotFound(item_id))?;

        let item = {
            let mut entry = slot.lock();
            entry.retired = true;
            entry.item.clone()
        };
        self.core.capacity.release(item.tier);
        self.core.tracker.forget(item_id);
        self.core.protection.unprotect(item_id);

        tracing::info!(item_id = %item_id, tier = %item.tier, "Item untracked");
        Ok(item)
    }

    /// Start the periodic optimizer; no-op if already running
    pub fn start_scheduler(&self) {
        let mut scheduler = self.scheduler.lock();
        if scheduler.as_ref().is_some_and(SchedulerHandle::is_running) {
            tracing::warn!("Optimizer scheduler already running");
            return;
        }
        *scheduler = Some(SchedulerHandle::spawn(
            Arc::clone(&self.optimizer),
            self.config.optimizer.interval(),
        ));
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .as_ref()
            .is_some_and(SchedulerHandle::is_running)
    }

    /// Stop the scheduler, cancelling any pass in progress
    pub async fn shutdown(&self) {
        self.optimizer.cancel();
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
        tracing::info!("Retention engine shut down");
    }

    /// Ask a running pass to stop before its next item
    pub fn cancel_running_pass(&self) {
        self.optimizer.cancel();
    }

    pub fn optimizer_state(&self) -> OptimizerState {
        self.optimizer.state()
    }
}

/// Reserve a tier for a new item, store it, and index it
async fn place_new_item(
    core: Arc<EngineCore>,
    mut item: TrackedItem,
    signals: CachedSignals,
) -> Result<Placement> {
    core.tracker.register(item.id, &item.owner_id, item.created_at);
    let score = core.score_for(
        &item.owner_id,
        signals.relevance,
        signals.emotional_weight,
        item.created_at,
    );

    let mut attempts = 0;
    let (tier, reason, capacity_constrained) = loop {
        attempts += 1;
        let classification = core.classifier.classify(score, &core.occupancy());

        if let Some(victim) = classification.displace {
            if let Err(e) = core.displace(victim).await {
                tracing::warn!(
                    item_id = %victim.item_id,
                    error = %e,
                    "Displacement failed, retrying placement"
                );
            }
        }

        match core.capacity.try_admit(classification.tier) {
            Admission::Admitted => {
                break (
                    classification.tier,
                    classification.reason,
                    classification.capacity_constrained,
                );
            }
            Admission::CapacityExceeded if attempts < MAX_ADMIT_ATTEMPTS => {
                tracing::debug!(tier = %classification.tier, attempts, "Lost admission race, reclassifying");
            }
            Admission::CapacityExceeded => {
                core.capacity.admit_cold();
                break (
                    StorageTier::Cold,
                    format!(
                        "{CAPACITY_CONSTRAINED}: no room after {attempts} attempts, placed in cold"
                    ),
                    true,
                );
            }
        }
    };

    if capacity_constrained {
        core.metrics.record_capacity_fallback();
    }

    if let Err(e) = core.migrations.store_new(item.id, tier).await {
        core.capacity.release(tier);
        core.tracker.forget(item.id);
        core.metrics.record_migration_failure();
        tracing::warn!(item_id = %item.id, tier = %tier, error = %e, "Store rejected new item");
        return Err(RetentionError::Migration(e));
    }

    item.tier = tier;
    item.score = score;
    let placement = Placement {
        item_id: item.id,
        tier,
        score,
        reason,
        capacity_constrained,
    };
    core.index.insert(ItemEntry::new(item, signals));

    tracing::debug!(
        item_id = %placement.item_id,
        tier = %placement.tier,
        score = placement.score,
        reason = %placement.reason,
        "Placed new item"
    );
    Ok(placement)
}

