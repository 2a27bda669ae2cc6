//! Tier classification
//!
//! Maps a composite score to a tier by threshold, then checks the target
//! tier's occupancy. A full tier can make room by displacing its
//! lowest-scored unprotected member, but only if that member scores strictly
//! below the candidate; otherwise the candidate falls back one tier and the
//! decision is marked capacity-constrained. Cold is never constrained.
//!
//! Every decision carries a reason string for auditing.

use serde::{Deserialize, Serialize};

use crate::memory::types::{ItemId, StorageTier};

/// Reason prefix for decisions that placed an item below its threshold tier
pub const CAPACITY_CONSTRAINED: &str = "capacity-constrained";

/// Default minimum score for Hot
pub const DEFAULT_HOT_THRESHOLD: f64 = 0.7;
/// Default minimum score for Warm
pub const DEFAULT_WARM_THRESHOLD: f64 = 0.4;

/// Read-only view of tier occupancy consulted during classification
pub trait TierOccupancy {
    /// Whether `tier` can take one more item without displacement
    fn has_room(&self, tier: StorageTier) -> bool;

    /// Lowest-scored unprotected member of `tier` scoring strictly below
    /// `below`, if any
    fn displacement_candidate(&self, tier: StorageTier, below: f64) -> Option<Displacement> {
        let _ = (tier, below);
        None
    }
}

/// A member of a full tier chosen to make room for a higher-scored item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Displacement {
    pub item_id: ItemId,
    pub score: f64,
    /// The full tier the member is displaced from
    pub from: StorageTier,
}

/// Score thresholds between tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Scores at or above this go to Hot
    pub hot: f64,
    /// Scores at or above this (and below `hot`) go to Warm
    pub warm: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            hot: DEFAULT_HOT_THRESHOLD,
            warm: DEFAULT_WARM_THRESHOLD,
        }
    }
}

/// Outcome of a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Where the item should live
    pub tier: StorageTier,
    /// Where the score alone would put it
    pub threshold_tier: StorageTier,
    /// Placed below `threshold_tier` because hotter tiers were full
    pub capacity_constrained: bool,
    /// Member that must move out of `tier` first, if any
    pub displace: Option<Displacement>,
    /// Human-readable explanation
    pub reason: String,
}

/// Score-and-capacity tier classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct TierClassifier {
    thresholds: TierThresholds,
}

impl TierClassifier {
    pub fn new(thresholds: TierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> TierThresholds {
        self.thresholds
    }

    /// Tier by score alone
    pub fn threshold_tier(&self, score: f64) -> StorageTier {
        if score >= self.thresholds.hot {
            StorageTier::Hot
        } else if score >= self.thresholds.warm {
            StorageTier::Warm
        } else {
            StorageTier::Cold
        }
    }

    /// Classify a new item, falling back as far as Cold
    pub fn classify(&self, score: f64, occupancy: &impl TierOccupancy) -> Classification {
        self.place(score, self.threshold_tier(score), None, occupancy)
    }

    /// Classify starting no hotter than `start`
    ///
    /// Used to re-place a displaced member, which may not return to the tier
    /// it was just pushed out of.
    pub fn classify_from(
        &self,
        score: f64,
        start: StorageTier,
        occupancy: &impl TierOccupancy,
    ) -> Classification {
        let start = start.max(self.threshold_tier(score));
        self.place(score, start, None, occupancy)
    }

    /// Classify an item already in `current` whose score warrants a hotter
    /// tier. Only tiers hotter than `current` are considered; if none has
    /// room the item stays where it is.
    pub fn classify_promotion(
        &self,
        score: f64,
        current: StorageTier,
        occupancy: &impl TierOccupancy,
    ) -> Classification {
        self.place(score, self.threshold_tier(score), Some(current), occupancy)
    }

    fn place(
        &self,
        score: f64,
        start: StorageTier,
        current: Option<StorageTier>,
        occupancy: &impl TierOccupancy,
    ) -> Classification {
        let threshold_tier = self.threshold_tier(score);
        let basis = self.threshold_reason(score, threshold_tier);
        let mut full: Vec<StorageTier> = Vec::new();
        let mut tier = start;

        loop {
            if let Some(current) = current.filter(|c| !c.is_colder_than(tier)) {
                let reason = if full.is_empty() {
                    format!("{basis}; already in {current}")
                } else {
                    format!(
                        "{CAPACITY_CONSTRAINED}: {basis}; {} full of higher-priority items, stays in {current}",
                        join_tiers(&full)
                    )
                };
                return Classification {
                    tier: current,
                    threshold_tier,
                    capacity_constrained: !full.is_empty(),
                    displace: None,
                    reason,
                };
            }

            if tier == StorageTier::Cold || occupancy.has_room(tier) {
                return self.placed(score, tier, threshold_tier, &basis, &full, None);
            }

            if let Some(victim) = occupancy.displacement_candidate(tier, score) {
                return self.placed(score, tier, threshold_tier, &basis, &full, Some(victim));
            }

            full.push(tier);
            match tier.colder() {
                Some(next) => tier = next,
                None => {
                    return self.placed(score, StorageTier::Cold, threshold_tier, &basis, &full, None);
                }
            }
        }
    }

    fn placed(
        &self,
        score: f64,
        tier: StorageTier,
        threshold_tier: StorageTier,
        basis: &str,
        full: &[StorageTier],
        displace: Option<Displacement>,
    ) -> Classification {
        let mut reason = if full.is_empty() {
            basis.to_string()
        } else {
            format!(
                "{CAPACITY_CONSTRAINED}: {basis}; {} full of higher-priority items, placed in {tier}",
                join_tiers(full)
            )
        };
        if let Some(victim) = &displace {
            reason.push_str(&format!(
                "; displaces {} (score {:.3}) from full {} tier",
                victim.item_id, victim.score, victim.from
            ));
        }

        tracing::debug!(
            score,
            tier = %tier,
            threshold_tier = %threshold_tier,
            reason = %reason,
            "Classified item"
        );

        Classification {
            tier,
            threshold_tier,
            capacity_constrained: !full.is_empty(),
            displace,
            reason,
        }
    }

    fn threshold_reason(&self, score: f64, tier: StorageTier) -> String {
        let TierThresholds { hot, warm } = self.thresholds;
        match tier {
            StorageTier::Hot => format!("score {score:.3} >= hot threshold {hot:.2}"),
            StorageTier::Warm => format!("score {score:.3} in warm band [{warm:.2}, {hot:.2})"),
            StorageTier::Cold => format!("score {score:.3} < warm threshold {warm:.2}"),
        }
    }
}

fn join_tiers(tiers: &[StorageTier]) -> String {
    tiers
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" and ")
}
