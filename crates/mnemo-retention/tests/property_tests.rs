//! Property tests for scoring bounds and capacity accounting

use mnemo_retention::memory::types::StorageTier;
use mnemo_retention::memory::weight::{recency_bonus, relationship_depth, score};
use mnemo_retention::storage::{Admission, CapacityManager};
use proptest::prelude::*;

fn any_signal() -> impl Strategy<Value = f64> {
    prop_oneof![
        Just(0.0),
        Just(1.0),
        Just(f64::NAN),
        -2.0..3.0f64,
        0.0..=1.0f64,
    ]
}

fn any_tier() -> impl Strategy<Value = StorageTier> {
    prop_oneof![
        Just(StorageTier::Hot),
        Just(StorageTier::Warm),
        Just(StorageTier::Cold),
    ]
}

#[derive(Debug, Clone)]
enum Op {
    Admit(StorageTier),
    Release(StorageTier),
    Migrate(StorageTier, StorageTier),
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any_tier().prop_map(Op::Admit),
        any_tier().prop_map(Op::Release),
        (any_tier(), any_tier()).prop_map(|(from, to)| Op::Migrate(from, to)),
    ]
}

proptest! {
    #[test]
    fn score_stays_in_unit_interval(
        relevance in any_signal(),
        emotional in any_signal(),
        depth in any_signal(),
        recency in any_signal(),
    ) {
        let s = score(relevance, emotional, depth, recency);
        prop_assert!((0.0..=1.0).contains(&s), "score {} out of range", s);
    }

    #[test]
    fn score_is_monotonic_in_relevance(
        low in 0.0..=1.0f64,
        delta in 0.0..=1.0f64,
        emotional in 0.0..=1.0f64,
        depth in 0.0..=1.0f64,
    ) {
        let high = (low + delta).min(1.0);
        prop_assert!(score(high, emotional, depth, 0.0) >= score(low, emotional, depth, 0.0));
    }

    #[test]
    fn derived_signals_stay_in_unit_interval(
        interactions in 0u64..1_000_000,
        elapsed_mins in -1_000i64..10_000,
    ) {
        let depth = relationship_depth(interactions);
        prop_assert!((0.0..=1.0).contains(&depth));

        let bonus = recency_bonus(
            chrono::Duration::minutes(elapsed_mins),
            chrono::Duration::hours(24),
        );
        prop_assert!((0.0..=1.0).contains(&bonus));
    }

    /// Admissions, releases and admit-then-release migrations never push a
    /// bounded tier over its maximum
    #[test]
    fn capacity_never_exceeds_maximum(
        hot in 0usize..8,
        warm in 0usize..8,
        ops in prop::collection::vec(any_op(), 0..200),
    ) {
        let capacity = CapacityManager::new(hot, warm);
        let mut expected = [0usize; 3];

        for op in ops {
            match op {
                Op::Admit(tier) => {
                    if capacity.try_admit(tier) == Admission::Admitted {
                        expected[tier.rank()] += 1;
                    }
                }
                Op::Release(tier) => {
                    if expected[tier.rank()] > 0 {
                        capacity.release(tier);
                        expected[tier.rank()] -= 1;
                    }
                }
                Op::Migrate(from, to) => {
                    if from != to
                        && expected[from.rank()] > 0
                        && capacity.try_admit(to) == Admission::Admitted
                    {
                        capacity.release(from);
                        expected[from.rank()] -= 1;
                        expected[to.rank()] += 1;
                    }
                }
            }

            for tier in StorageTier::ALL {
                let current = capacity.current_count(tier);
                prop_assert_eq!(current, expected[tier.rank()]);
                if let Some(max) = capacity.max_capacity(tier) {
                    prop_assert!(current <= max, "{} holds {} > {}", tier, current, max);
                }
            }
        }
    }
}
