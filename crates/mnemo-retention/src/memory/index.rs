//! Engine-owned index of tracked items
//!
//! Each item lives in its own [`ItemSlot`] behind a short-lived mutex. The
//! map itself is a `DashMap`, so lookups never serialize on a global lock.
//!
//! Lock order: never touch the map (insert, remove, iterate) while holding
//! an item's entry mutex. Collect the slots first, then lock them one at a
//! time. The access tracker may be called under an entry mutex, never the
//! other way round.
//!
//! Alongside the main map the index keeps per-tier membership, so a scan of
//! one tier only visits that tier's items.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::memory::types::{ItemId, StorageTier, TrackedItem};

/// Last-known classifier signals for an item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedSignals {
    pub relevance: f64,
    pub emotional_weight: f64,
    /// When the classifier last answered for this item
    pub fetched_at: DateTime<Utc>,
}

/// Mutable bookkeeping for one item
#[derive(Debug, Clone)]
pub struct ItemEntry {
    pub item: TrackedItem,
    pub signals: CachedSignals,
    /// Score was last computed from cached signals
    pub stale_score: bool,
    /// Undecayed composite score from the latest signals
    pub base_score: f64,
    /// Accumulated decay multiplier, reset to 1 on access
    pub decay_factor: f64,
    pub last_decayed_at: Option<DateTime<Utc>>,
    /// Set once the caller untracks the item; pending migrations must not
    /// resurrect it
    pub retired: bool,
}

impl ItemEntry {
    pub fn new(item: TrackedItem, signals: CachedSignals) -> Self {
        let base_score = item.score;
        Self {
            item,
            signals,
            stale_score: false,
            base_score,
            decay_factor: 1.0,
            last_decayed_at: None,
            retired: false,
        }
    }

    /// `base_score × decay_factor`, clamped to [0, 1]
    pub fn effective_score(&self) -> f64 {
        let score = self.base_score * self.decay_factor;
        if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        }
    }
}

/// One item's slot in the index
#[derive(Debug)]
pub struct ItemSlot {
    id: ItemId,
    owner_id: String,
    entry: Mutex<ItemEntry>,
    migrating: AtomicBool,
}

impl ItemSlot {
    fn new(entry: ItemEntry) -> Self {
        Self {
            id: entry.item.id,
            owner_id: entry.item.owner_id.clone(),
            entry: Mutex::new(entry),
            migrating: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Lock the entry. Keep the guard short and never hold it across an
    /// `.await` or a map operation.
    pub fn lock(&self) -> MutexGuard<'_, ItemEntry> {
        self.entry.lock()
    }

    /// Copy of the entry
    pub fn snapshot(&self) -> ItemEntry {
        self.entry.lock().clone()
    }

    /// Claim the item for a migration; `None` if one is already in flight
    pub fn begin_migration(&self) -> Option<MigrationClaim<'_>> {
        self.migrating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| MigrationClaim { slot: self })
    }

    pub fn is_migrating(&self) -> bool {
        self.migrating.load(Ordering::Acquire)
    }
}

/// Released on drop, including when a migration future is abandoned
#[derive(Debug)]
pub struct MigrationClaim<'a> {
    slot: &'a ItemSlot,
}

impl Drop for MigrationClaim<'_> {
    fn drop(&mut self) {
        self.slot.migrating.store(false, Ordering::Release);
    }
}

/// Index of every item the engine tracks
#[derive(Debug, Default)]
pub struct ItemIndex {
    items: DashMap<ItemId, Arc<ItemSlot>>,
    by_tier: [DashMap<ItemId, Arc<ItemSlot>>; 3],
}

impl ItemIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new item; returns its slot
    pub fn insert(&self, entry: ItemEntry) -> Arc<ItemSlot> {
        let tier = entry.item.tier;
        let slot = Arc::new(ItemSlot::new(entry));
        self.items.insert(slot.id(), Arc::clone(&slot));
        self.by_tier[tier.rank()].insert(slot.id(), Arc::clone(&slot));
        slot
    }

    pub fn get(&self, item_id: ItemId) -> Option<Arc<ItemSlot>> {
        self.items.get(&item_id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, item_id: ItemId) -> Option<Arc<ItemSlot>> {
        let removed = self.items.remove(&item_id).map(|(_, slot)| slot);
        for members in &self.by_tier {
            members.remove(&item_id);
        }
        removed
    }

    /// Move an item's tier membership after a committed migration. No-op
    /// unless the item is currently listed under `from`.
    pub fn retier(&self, item_id: ItemId, from: StorageTier, to: StorageTier) {
        let Some((_, slot)) = self.by_tier[from.rank()].remove(&item_id) else {
            return;
        };
        self.by_tier[to.rank()].insert(item_id, slot);
        // Lost a race with remove()
        if !self.items.contains_key(&item_id) {
            self.by_tier[to.rank()].remove(&item_id);
        }
    }

    pub fn contains(&self, item_id: ItemId) -> bool {
        self.items.contains_key(&item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slots of every item, or of one owner's items
    pub fn slots(&self, owner_id: Option<&str>) -> Vec<Arc<ItemSlot>> {
        self.items
            .iter()
            .filter(|s| owner_id.is_none_or(|owner| s.owner_id() == owner))
            .map(|s| Arc::clone(s.value()))
            .collect()
    }

    /// Slots currently listed under `tier`
    pub fn slots_in_tier(&self, tier: StorageTier) -> Vec<Arc<ItemSlot>> {
        self.by_tier[tier.rank()]
            .iter()
            .map(|s| Arc::clone(s.value()))
            .collect()
    }

    /// Item count per tier, every tier present
    pub fn tier_counts(&self, owner_id: Option<&str>) -> BTreeMap<StorageTier, usize> {
        let mut counts: BTreeMap<StorageTier, usize> =
            StorageTier::ALL.iter().map(|t| (*t, 0)).collect();
        for slot in self.slots(owner_id) {
            let entry = slot.lock();
            if !entry.retired {
                *counts.entry(entry.item.tier).or_default() += 1;
            }
        }
        counts
    }
}
