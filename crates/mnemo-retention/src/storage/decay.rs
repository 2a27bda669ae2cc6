//! Score decay for stale items
//!
//! An unprotected item untouched for the staleness window loses
//! `decay_rate` of its score each decay interval. Decay accumulates in the
//! entry's `decay_factor` so fresh classifier signals still flow into the
//! score underneath it; an access resets the factor. Decay never deletes
//! anything: the classifier turns a low score into Cold and Cold is the floor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::index::ItemEntry;

/// Default fraction of score lost per decay step
pub const DEFAULT_DECAY_RATE: f64 = 0.1;
/// Default days without access before an item counts as stale
pub const DEFAULT_STALENESS_DAYS: i64 = 7;
/// Default minimum spacing between two decay steps of the same item
pub const DEFAULT_DECAY_INTERVAL_HOURS: i64 = 6;

/// When and how fast scores decay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayPolicy {
    pub decay_rate: f64,
    pub staleness: Duration,
    pub interval: Duration,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            decay_rate: DEFAULT_DECAY_RATE,
            staleness: Duration::days(DEFAULT_STALENESS_DAYS),
            interval: Duration::hours(DEFAULT_DECAY_INTERVAL_HOURS),
        }
    }
}

/// What happened to one item's score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DecayOutcome {
    /// Protected: decay skipped, score may only rise
    Protected,
    /// Accessed within the staleness window
    Fresh,
    /// Stale, but decayed less than one interval ago
    NotDue,
    /// Score multiplied by `1 - decay_rate`
    Decayed { previous: f64, score: f64 },
}

/// Applies decay and recomputes an entry's score
#[derive(Debug, Clone, Copy, Default)]
pub struct DecayEngine {
    policy: DecayPolicy,
}

impl DecayEngine {
    pub fn new(policy: DecayPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DecayPolicy {
        self.policy
    }

    /// Whether an item last accessed at `last_accessed_at` is stale at `now`
    pub fn is_stale(&self, last_accessed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_accessed_at >= self.policy.staleness
    }

    /// Fold a freshly computed base score into the entry and decay it if due
    ///
    /// Protected entries only take the new score if it is higher.
    pub fn apply(
        &self,
        entry: &mut ItemEntry,
        base_score: f64,
        protected: bool,
        now: DateTime<Utc>,
    ) -> DecayOutcome {
        entry.base_score = base_score;

        if protected {
            let fresh = entry.effective_score();
            if fresh > entry.item.score {
                entry.item.score = fresh;
            }
            return DecayOutcome::Protected;
        }

        let outcome = if !self.is_stale(entry.item.last_accessed_at, now) {
            DecayOutcome::Fresh
        } else if entry
            .last_decayed_at
            .is_some_and(|at| now - at < self.policy.interval)
        {
            DecayOutcome::NotDue
        } else {
            let previous = entry.item.score;
            entry.decay_factor *= 1.0 - self.policy.decay_rate;
            entry.last_decayed_at = Some(now);
            DecayOutcome::Decayed {
                previous,
                score: entry.effective_score(),
            }
        };

        entry.item.score = entry.effective_score();

        if let DecayOutcome::Decayed { previous, score } = outcome {
            tracing::debug!(
                item_id = %entry.item.id,
                previous,
                score,
                decay_factor = entry.decay_factor,
                "Decayed stale item"
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::index::CachedSignals;
    use crate::memory::types::{StorageTier, TrackedItem};
    use crate::storage::tiers::TierClassifier;

    const EPS: f64 = 1e-9;

    fn warm_entry(score: f64, created: DateTime<Utc>) -> ItemEntry {
        let item = TrackedItem::new("user-1", "conv-1", StorageTier::Warm, score, created);
        ItemEntry::new(
            item,
            CachedSignals {
                relevance: 0.75,
                emotional_weight: 0.0,
                fetched_at: created,
            },
        )
    }

    #[test]
    fn test_fresh_item_not_decayed() {
        let engine = DecayEngine::default();
        let now = Utc::now();
        let mut entry = warm_entry(0.45, now);

        let outcome = engine.apply(&mut entry, 0.45, false, now + Duration::days(6));

        assert_eq!(outcome, DecayOutcome::Fresh);
        assert!((entry.item.score - 0.45).abs() < EPS);
    }

    #[test]
    fn test_scenario_c_decays_to_cold_on_second_pass() {
        let engine = DecayEngine::default();
        let classifier = TierClassifier::default();
        let created = Utc::now();
        let mut entry = warm_entry(0.45, created);
        let mut now = created + Duration::days(8);

        let expected = [(0.405, StorageTier::Warm), (0.3645, StorageTier::Cold), (0.32805, StorageTier::Cold)];
        for (pass, (score, tier)) in expected.iter().enumerate() {
            let outcome = engine.apply(&mut entry, 0.45, false, now);
            assert!(matches!(outcome, DecayOutcome::Decayed { .. }), "pass {pass}");
            assert!((entry.item.score - score).abs() < EPS, "pass {pass}: {}", entry.item.score);
            assert_eq!(classifier.threshold_tier(entry.item.score), *tier, "pass {pass}");
            now += Duration::hours(6);
        }
    }

    #[test]
    fn test_back_to_back_passes_decay_once() {
        let engine = DecayEngine::default();
        let created = Utc::now();
        let mut entry = warm_entry(0.45, created);
        let now = created + Duration::days(8);

        engine.apply(&mut entry, 0.45, false, now);
        let outcome = engine.apply(&mut entry, 0.45, false, now + Duration::minutes(5));

        assert_eq!(outcome, DecayOutcome::NotDue);
        assert!((entry.item.score - 0.405).abs() < EPS);
    }

    #[test]
    fn test_protected_item_untouched() {
        let engine = DecayEngine::default();
        let created = Utc::now();
        let mut entry = warm_entry(0.45, created);
        let mut now = created + Duration::days(8);

        for _ in 0..10 {
            let outcome = engine.apply(&mut entry, 0.45, true, now);
            assert_eq!(outcome, DecayOutcome::Protected);
            now += Duration::hours(6);
        }

        assert!((entry.item.score - 0.45).abs() < EPS);
        assert_eq!(entry.decay_factor, 1.0);
        assert!(entry.last_decayed_at.is_none());
    }

    #[test]
    fn test_protected_item_may_rise() {
        let engine = DecayEngine::default();
        let now = Utc::now();
        let mut entry = warm_entry(0.45, now);

        engine.apply(&mut entry, 0.3, true, now);
        assert!((entry.item.score - 0.45).abs() < EPS);

        engine.apply(&mut entry, 0.8, true, now);
        assert!((entry.item.score - 0.8).abs() < EPS);
    }

    #[test]
    fn test_unaccessed_score_is_non_increasing() {
        let engine = DecayEngine::new(DecayPolicy {
            decay_rate: 0.25,
            ..DecayPolicy::default()
        });
        let created = Utc::now();
        let mut entry = warm_entry(0.9, created);
        let mut now = created + Duration::days(7);
        let mut previous = entry.item.score;

        for _ in 0..50 {
            engine.apply(&mut entry, 0.9, false, now);
            assert!(entry.item.score <= previous);
            assert!(entry.item.score >= 0.0);
            previous = entry.item.score;
            now += Duration::hours(3);
        }
        assert!(previous < 0.01);
    }
}
