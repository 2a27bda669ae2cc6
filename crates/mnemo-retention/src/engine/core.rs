//! Shared engine state
//!
//! Everything the facade and the optimizer both need: the components, the
//! score computation that reads owner activity, and the placement helpers
//! (fallback demotion, displacement, promotion) built on the classifier and
//! the migration executor.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::MigrationError;
use crate::memory::access::AccessTracker;
use crate::memory::index::ItemIndex;
use crate::memory::protection::ProtectionRegistry;
use crate::memory::types::{ItemId, StorageTier};
use crate::memory::weight::{RelevanceScorer, ScoreInputs, clamp_unit, relationship_depth};
use crate::metrics::MetricsReporter;
use crate::signals::SignalSource;
use crate::storage::capacity::CapacityManager;
use crate::storage::decay::DecayEngine;
use crate::storage::migration::{MigrationExecutor, TierStore};
use crate::storage::tiers::{Displacement, TierClassifier, TierOccupancy};

/// Result of settling one item into the tier its score warrants
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Settlement {
    /// Moved, possibly after displacing a lower-scored member
    Moved {
        from: StorageTier,
        to: StorageTier,
        displaced: bool,
    },
    /// Every eligible tier was full of higher-priority items
    Blocked,
    /// Already in the right tier (or untracked meanwhile)
    NotNeeded,
}

#[derive(Debug)]
pub struct EngineCore {
    pub clock: Arc<dyn Clock>,
    pub index: Arc<ItemIndex>,
    pub tracker: Arc<AccessTracker>,
    pub protection: Arc<ProtectionRegistry>,
    pub capacity: Arc<CapacityManager>,
    pub migrations: Arc<MigrationExecutor>,
    pub signals: Arc<dyn SignalSource>,
    pub metrics: Arc<MetricsReporter>,
    pub scorer: RelevanceScorer,
    pub classifier: TierClassifier,
    pub decay: DecayEngine,
}

impl EngineCore {
    /// Wire up every component from `config`
    pub fn new(
        config: &Config,
        signals: Arc<dyn SignalSource>,
        store: Arc<dyn TierStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let index = Arc::new(ItemIndex::new());
        let capacity = Arc::new(CapacityManager::new(
            config.tiers.hot_capacity,
            config.tiers.warm_capacity,
        ));
        let metrics = Arc::new(MetricsReporter::new());
        let migrations = Arc::new(MigrationExecutor::new(
            Arc::clone(&index),
            Arc::clone(&capacity),
            store,
            Arc::clone(&metrics),
            Arc::clone(&clock),
            config.migration.store_timeout(),
        ));

        Self {
            clock,
            index,
            tracker: Arc::new(AccessTracker::new(config.access.latency_window)),
            protection: Arc::new(ProtectionRegistry::new()),
            capacity,
            migrations,
            signals,
            metrics,
            scorer: RelevanceScorer::new(config.scoring.recency_window()),
            classifier: TierClassifier::new(config.tiers.thresholds()),
            decay: DecayEngine::new(config.decay.policy()),
        }
    }

    /// Composite score for an item of `owner_id` with the given signals
    pub fn score_for(
        &self,
        owner_id: &str,
        relevance: f64,
        emotional_weight: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let activity = self.tracker.owner_activity(owner_id);
        let inputs = ScoreInputs {
            relevance,
            emotional_weight,
            relationship_depth: relationship_depth(activity.map_or(0, |a| a.interactions)),
            recency_bonus: self
                .scorer
                .recency_bonus(activity.map(|a| a.last_interaction_at), now),
        };
        self.scorer.score(&inputs)
    }

    pub fn occupancy(&self) -> IndexOccupancy<'_> {
        IndexOccupancy { core: self }
    }

    /// Move an item toward `target`, falling further down whenever a tier is
    /// full. Cold always admits. Returns the tier the item ended in.
    pub async fn migrate_with_fallback(
        &self,
        item_id: ItemId,
        from: StorageTier,
        target: StorageTier,
    ) -> Result<StorageTier, MigrationError> {
        let mut to = target;
        loop {
            if to == from {
                return Ok(from);
            }
            match self.migrations.migrate(item_id, from, to).await {
                Ok(()) => return Ok(to),
                Err(MigrationError::CapacityExceeded(full)) => {
                    self.metrics.record_capacity_fallback();
                    match full.colder() {
                        Some(next) => {
                            tracing::info!(
                                item_id = %item_id,
                                full = %full,
                                next = %next,
                                "{}: falling back",
                                crate::storage::tiers::CAPACITY_CONSTRAINED
                            );
                            to = next;
                        }
                        None => return Err(MigrationError::CapacityExceeded(full)),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move a displaced member out of its full tier
    ///
    /// The member is re-placed below the tier it leaves. If that tier is full
    /// too, its own lowest-scored unprotected member goes down first; with
    /// three tiers the chain is at most two moves long.
    pub async fn displace(&self, victim: Displacement) -> Result<StorageTier, MigrationError> {
        let Some(below) = victim.from.colder() else {
            return Ok(victim.from);
        };
        tracing::info!(
            item_id = %victim.item_id,
            score = victim.score,
            from = %victim.from,
            "Displacing lowest-priority member"
        );

        let placement = self
            .classifier
            .classify_from(victim.score, below, &self.occupancy());
        if let Some(next) = placement.displace {
            let to = next.from.colder().unwrap_or(StorageTier::Cold);
            self.migrate_with_fallback(next.item_id, next.from, to).await?;
        }
        self.migrate_with_fallback(victim.item_id, victim.from, placement.tier)
            .await
    }

    /// Move an item to the tier its current score warrants, as far as
    /// capacity allows
    ///
    /// Handles promotions and demotions that found their target tier full.
    /// Re-reads the item's tier and score, so a plan computed earlier in a
    /// pass is safe to act on. Protected items are never moved down.
    pub async fn settle(&self, item_id: ItemId) -> Result<Settlement, MigrationError> {
        let Some(slot) = self.index.get(item_id) else {
            return Ok(Settlement::NotNeeded);
        };
        let protected = self.protection.is_protected(item_id);
        let (current, score) = {
            let entry = slot.lock();
            if entry.retired {
                return Ok(Settlement::NotNeeded);
            }
            (entry.item.tier, entry.item.score)
        };

        let threshold = self.classifier.threshold_tier(score);
        let promoting = current.is_colder_than(threshold);
        if threshold == current || (!promoting && protected) {
            return Ok(Settlement::NotNeeded);
        }

        let classification = if promoting {
            self.classifier
                .classify_promotion(score, current, &self.occupancy())
        } else {
            self.classifier.classify(score, &self.occupancy())
        };
        if classification.capacity_constrained {
            self.metrics.record_capacity_fallback();
        }
        if classification.tier == current {
            tracing::debug!(item_id = %item_id, reason = %classification.reason, "Item stays put");
            return Ok(Settlement::Blocked);
        }

        let displaced = match classification.displace {
            Some(victim) => {
                self.displace(victim).await?;
                true
            }
            None => false,
        };

        let to = if promoting {
            self.migrations
                .migrate(item_id, current, classification.tier)
                .await?;
            classification.tier
        } else {
            self.migrate_with_fallback(item_id, current, classification.tier)
                .await?
        };

        Ok(Settlement::Moved {
            from: current,
            to,
            displaced,
        })
    }
}

/// Occupancy backed by the capacity counters and the live index
#[derive(Debug, Clone, Copy)]
pub struct IndexOccupancy<'a> {
    core: &'a EngineCore,
}

impl TierOccupancy for IndexOccupancy<'_> {
    fn has_room(&self, tier: StorageTier) -> bool {
        self.core.capacity.has_room(tier)
    }

    /// Members are rescored against the owner's current activity before the
    /// comparison, so they are judged on the same footing as the candidate.
    fn displacement_candidate(&self, tier: StorageTier, below: f64) -> Option<Displacement> {
        let now = self.core.clock.now();
        let mut lowest: Option<Displacement> = None;

        for slot in self.core.index.slots_in_tier(tier) {
            if slot.is_migrating() || self.core.protection.is_protected(slot.id()) {
                continue;
            }
            let (signals, decay_factor) = {
                let entry = slot.lock();
                if entry.retired || entry.item.tier != tier {
                    continue;
                }
                (entry.signals, entry.decay_factor)
            };
            let base = self.core.score_for(
                slot.owner_id(),
                signals.relevance,
                signals.emotional_weight,
                now,
            );
            let score = clamp_unit(base * decay_factor);
            if score >= below {
                continue;
            }
            if lowest.is_none_or(|l| score < l.score) {
                lowest = Some(Displacement {
                    item_id: slot.id(),
                    score,
                    from: tier,
                });
            }
        }

        lowest
    }
}
