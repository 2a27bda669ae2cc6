//! In-process placement ledger
//!
//! A [`TierStore`] that records which tier each item lives in without holding
//! any payload. The daemon uses it when no external store is wired in, and it
//! doubles as the reference the engine's bookkeeping is checked against in
//! tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::memory::types::{ItemId, StorageTier};
use crate::storage::migration::TierStore;

#[derive(Debug, Default)]
pub struct InMemoryTierStore {
    placements: DashMap<ItemId, StorageTier>,
}

impl InMemoryTierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tier the store holds the item in
    pub fn tier_of(&self, item_id: ItemId) -> Option<StorageTier> {
        self.placements.get(&item_id).map(|t| *t.value())
    }

    /// Drop an item's placement (the caller's physical delete)
    pub fn forget(&self, item_id: ItemId) -> Option<StorageTier> {
        self.placements.remove(&item_id).map(|(_, tier)| tier)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn tier_counts(&self) -> BTreeMap<StorageTier, usize> {
        let mut counts: BTreeMap<StorageTier, usize> =
            StorageTier::ALL.iter().map(|t| (*t, 0)).collect();
        for placement in self.placements.iter() {
            *counts.entry(*placement.value()).or_default() += 1;
        }
        counts
    }
}

#[async_trait]
impl TierStore for InMemoryTierStore {
    async fn store_physical(&self, item_id: ItemId, tier: StorageTier) -> Result<(), StoreError> {
        self.placements.insert(item_id, tier);
        Ok(())
    }

    async fn move_physical(
        &self,
        item_id: ItemId,
        from: StorageTier,
        to: StorageTier,
    ) -> Result<(), StoreError> {
        let mut placement = self
            .placements
            .get_mut(&item_id)
            .ok_or(StoreError::Missing(item_id))?;

        if *placement != from {
            return Err(StoreError::Conflict {
                item_id,
                expected: from,
                actual: *placement,
            });
        }

        *placement = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_store_and_move() {
        let store = InMemoryTierStore::new();
        let id = Uuid::new_v4();

        store.store_physical(id, StorageTier::Warm).await.unwrap();
        store
            .move_physical(id, StorageTier::Warm, StorageTier::Hot)
            .await
            .unwrap();

        assert_eq!(store.tier_of(id), Some(StorageTier::Hot));
        assert_eq!(store.tier_counts()[&StorageTier::Hot], 1);
    }

    #[tokio::test]
    async fn test_move_missing_item() {
        let store = InMemoryTierStore::new();
        let id = Uuid::new_v4();

        let err = store
            .move_physical(id, StorageTier::Hot, StorageTier::Warm)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Missing(id));
    }

    #[tokio::test]
    async fn test_move_from_wrong_tier_conflicts() {
        let store = InMemoryTierStore::new();
        let id = Uuid::new_v4();
        store.store_physical(id, StorageTier::Cold).await.unwrap();

        let err = store
            .move_physical(id, StorageTier::Hot, StorageTier::Warm)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { actual: StorageTier::Cold, .. }));
        assert_eq!(store.tier_of(id), Some(StorageTier::Cold));
    }

    #[tokio::test]
    async fn test_forget() {
        let store = InMemoryTierStore::new();
        let id = Uuid::new_v4();
        store.store_physical(id, StorageTier::Hot).await.unwrap();

        assert_eq!(store.forget(id), Some(StorageTier::Hot));
        assert!(store.is_empty());
    }
}
