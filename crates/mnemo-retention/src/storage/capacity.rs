//! Per-tier capacity accounting
//!
//! Each tier's occupancy is a single atomic counter. Admission is one
//! compare-and-increment (`fetch_update`), so two concurrent admissions can
//! never both take the last free slot.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::memory::types::StorageTier;
use crate::storage::tiers::TierOccupancy;

/// Result of an admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Admitted,
    CapacityExceeded,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Occupancy of one tier at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapacity {
    pub tier: StorageTier,
    /// `None` for an unbounded tier
    pub max: Option<usize>,
    pub current: usize,
}

impl TierCapacity {
    pub fn has_room(&self) -> bool {
        self.max.is_none_or(|max| self.current < max)
    }
}

/// Occupancy of every tier, hottest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub tiers: Vec<TierCapacity>,
}

impl CapacitySnapshot {
    pub fn get(&self, tier: StorageTier) -> Option<&TierCapacity> {
        self.tiers.iter().find(|t| t.tier == tier)
    }
}

impl TierOccupancy for CapacitySnapshot {
    fn has_room(&self, tier: StorageTier) -> bool {
        tier == StorageTier::Cold || self.get(tier).is_none_or(TierCapacity::has_room)
    }
}

/// Tracks how many items occupy each tier
#[derive(Debug)]
pub struct CapacityManager {
    counts: [AtomicUsize; 3],
    limits: [Option<usize>; 3],
}

impl CapacityManager {
    /// Hot and Warm are bounded; Cold is unbounded
    pub fn new(hot_capacity: usize, warm_capacity: usize) -> Self {
        Self {
            counts: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            limits: [Some(hot_capacity), Some(warm_capacity), None],
        }
    }

    /// Take one slot in `tier` if it has room
    pub fn try_admit(&self, tier: StorageTier) -> Admission {
        let limit = self.limits[tier.rank()].unwrap_or(usize::MAX);
        let admitted = self.counts[tier.rank()]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < limit).then_some(current + 1)
            })
            .is_ok();

        if admitted {
            Admission::Admitted
        } else {
            tracing::debug!(tier = %tier, limit, "Tier at capacity");
            Admission::CapacityExceeded
        }
    }

    /// Take a slot in Cold, which never refuses
    pub fn admit_cold(&self) {
        self.counts[StorageTier::Cold.rank()].fetch_add(1, Ordering::AcqRel);
    }

    /// Give back one slot in `tier`
    pub fn release(&self, tier: StorageTier) {
        let released = self.counts[tier.rank()]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok();

        if !released {
            tracing::warn!(tier = %tier, "Released a slot from an empty tier");
        }
    }

    pub fn current_count(&self, tier: StorageTier) -> usize {
        self.counts[tier.rank()].load(Ordering::Acquire)
    }

    pub fn max_capacity(&self, tier: StorageTier) -> Option<usize> {
        self.limits[tier.rank()]
    }

    pub fn has_room(&self, tier: StorageTier) -> bool {
        self.capacity(tier).has_room()
    }

    pub fn capacity(&self, tier: StorageTier) -> TierCapacity {
        TierCapacity {
            tier,
            max: self.max_capacity(tier),
            current: self.current_count(tier),
        }
    }

    pub fn snapshot(&self) -> CapacitySnapshot {
        CapacitySnapshot {
            tiers: StorageTier::ALL.iter().map(|t| self.capacity(*t)).collect(),
        }
    }
}
