//! Tier migration
//!
//! Moves one item between tiers as a small compensating transaction:
//!
//! 1. reserve a slot in the destination tier
//! 2. ask the external store to move the payload (bounded by a timeout)
//! 3. record the new tier on the item
//! 4. release the slot in the source tier
//!
//! If step 2 fails or times out the reservation is released and the item
//! stays where it was, so the engine never disagrees with the store about
//! where an item lives. The caller retries on the next optimization pass.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::error::{MigrationError, StoreError};
use crate::memory::index::ItemIndex;
use crate::memory::types::{ItemId, StorageTier};
use crate::metrics::MetricsReporter;
use crate::storage::capacity::{Admission, CapacityManager};

/// Default bound on a single external store call
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;

/// External store holding item payloads
///
/// The engine only ever tells the store where an item should live; it never
/// reads or writes payload bytes.
#[async_trait]
pub trait TierStore: Send + Sync + Debug {
    /// Persist a new item in `tier`
    async fn store_physical(&self, item_id: ItemId, tier: StorageTier) -> Result<(), StoreError>;

    /// Move an existing item from `from` to `to`
    async fn move_physical(
        &self,
        item_id: ItemId,
        from: StorageTier,
        to: StorageTier,
    ) -> Result<(), StoreError>;
}

/// Performs single-item migrations against a [`TierStore`]
#[derive(Debug)]
pub struct MigrationExecutor {
    index: Arc<ItemIndex>,
    capacity: Arc<CapacityManager>,
    store: Arc<dyn TierStore>,
    metrics: Arc<MetricsReporter>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl MigrationExecutor {
    pub fn new(
        index: Arc<ItemIndex>,
        capacity: Arc<CapacityManager>,
        store: Arc<dyn TierStore>,
        metrics: Arc<MetricsReporter>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            index,
            capacity,
            store,
            metrics,
            clock,
            store_timeout,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Persist a new item, bounded by the store timeout
    ///
    /// Capacity for `tier` must already be reserved by the caller.
    pub async fn store_new(&self, item_id: ItemId, tier: StorageTier) -> Result<(), MigrationError> {
        match tokio::time::timeout(self.store_timeout, self.store.store_physical(item_id, tier)).await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MigrationError::Store(e)),
            Err(_) => Err(MigrationError::Timeout(self.timeout_ms())),
        }
    }

    /// Move `item_id` from `from` to `to`
    ///
    /// On any error the item is left in `from` with capacity unchanged.
    pub async fn migrate(
        &self,
        item_id: ItemId,
        from: StorageTier,
        to: StorageTier,
    ) -> Result<(), MigrationError> {
        if from == to {
            return Ok(());
        }

        let result = self.try_migrate(item_id, from, to).await;
        match &result {
            Ok(()) => {
                self.metrics.record_migration();
                tracing::info!(item_id = %item_id, from = %from, to = %to, "Migrated item");
            }
            Err(MigrationError::CapacityExceeded(_)) => {}
            Err(e) => {
                self.metrics.record_migration_failure();
                tracing::warn!(
                    item_id = %item_id,
                    from = %from,
                    to = %to,
                    error = %e,
                    "Migration failed, item left in place"
                );
            }
        }
        result
    }

    async fn try_migrate(
        &self,
        item_id: ItemId,
        from: StorageTier,
        to: StorageTier,
    ) -> Result<(), MigrationError> {
        let slot = self
            .index
            .get(item_id)
            .ok_or(MigrationError::ItemNotFound(item_id))?;
        let _claim = slot
            .begin_migration()
            .ok_or(MigrationError::InFlight(item_id))?;

        {
            let entry = slot.lock();
            if entry.retired {
                return Err(MigrationError::ItemNotFound(item_id));
            }
            if entry.item.tier != from {
                return Err(MigrationError::TierMismatch {
                    item_id,
                    expected: from,
                    actual: entry.item.tier,
                });
            }
        }

        // 1. reserve
        if self.capacity.try_admit(to) == Admission::CapacityExceeded {
            return Err(MigrationError::CapacityExceeded(to));
        }

        // 2. physical move
        let moved =
            tokio::time::timeout(self.store_timeout, self.store.move_physical(item_id, from, to))
                .await;
        match moved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.capacity.release(to);
                self.metrics.record_rollback();
                tracing::warn!(item_id = %item_id, error = %e, "Store rejected move, released reservation");
                return Err(MigrationError::Store(e));
            }
            Err(_) => {
                self.capacity.release(to);
                self.metrics.record_rollback();
                self.reverse_after_timeout(item_id, from, to).await;
                return Err(MigrationError::Timeout(self.timeout_ms()));
            }
        }

        // 3. commit
        let now = self.clock.now();
        {
            let mut entry = slot.lock();
            if entry.retired {
                // Untracked mid-move; untracking already released `from`.
                drop(entry);
                self.capacity.release(to);
                return Err(MigrationError::ItemNotFound(item_id));
            }
            entry.item.tier = to;
            entry.item.tier_assigned_at = now;
        }
        self.index.retier(item_id, from, to);

        // 4. release source
        self.capacity.release(from);
        Ok(())
    }

    /// The store may still complete a move we stopped waiting for, so ask it
    /// to put the item back. Best effort, bounded by the same timeout.
    async fn reverse_after_timeout(&self, item_id: ItemId, from: StorageTier, to: StorageTier) {
        let reversed =
            tokio::time::timeout(self.store_timeout, self.store.move_physical(item_id, to, from))
                .await;
        match reversed {
            Ok(Ok(())) => {
                tracing::warn!(item_id = %item_id, from = %to, to = %from, "Reversed timed-out move");
            }
            Ok(Err(e)) => {
                tracing::debug!(item_id = %item_id, error = %e, "Nothing to reverse after timed-out move");
            }
            Err(_) => {
                tracing::error!(
                    item_id = %item_id,
                    "Store unresponsive after timed-out move; placement will be rechecked next pass"
                );
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.store_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}
