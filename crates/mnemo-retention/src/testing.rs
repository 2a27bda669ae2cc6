//! Test utilities for mnemo-retention - scriptable collaborators
//!
//! Deterministic stand-ins for the external classifier and store, so tests
//! can simulate outages, slow calls and failed moves:
//! - [`ScriptedSignals`]: settable signals with an outage switch
//! - [`FlakyStore`]: a placement ledger that fails or hangs on demand
//!
//! Pair them with [`ManualClock`](crate::clock::ManualClock) to run
//! multi-day scenarios instantly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{SignalError, StoreError};
use crate::memory::types::{ItemId, ItemRef, StorageTier};
use crate::signals::{SignalReading, SignalSource};
use crate::storage::memory_store::InMemoryTierStore;
use crate::storage::migration::TierStore;

/// Classifier whose answers are set by the test
#[derive(Debug, Default)]
pub struct ScriptedSignals {
    readings: DashMap<ItemId, SignalReading>,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicU64,
}

impl ScriptedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, item_id: ItemId, relevance: f64, emotional_weight: f64) {
        self.readings.insert(
            item_id,
            SignalReading {
                relevance,
                emotional_weight,
            },
        );
    }

    /// Simulate a classifier outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every answer by `delay`
    pub fn set_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of signal requests received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, item: &ItemRef) -> Result<SignalReading, SignalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SignalError::Unavailable("scripted outage".to_string()));
        }
        self.readings
            .get(&item.id)
            .map(|r| *r.value())
            .ok_or(SignalError::UnknownItem(item.id))
    }
}

#[async_trait]
impl SignalSource for ScriptedSignals {
    async fn get_relevance(&self, item: &ItemRef) -> Result<f64, SignalError> {
        self.answer(item).await.map(|r| r.relevance)
    }

    async fn get_emotional_weight(&self, item: &ItemRef) -> Result<f64, SignalError> {
        self.answer(item).await.map(|r| r.emotional_weight)
    }
}

/// Store that fails or hangs when told to
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryTierStore,
    fail_moves: AtomicBool,
    hang_moves: AtomicBool,
    fail_stores: AtomicBool,
    move_calls: AtomicU64,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The placement ledger behind the failures
    pub fn inner(&self) -> &InMemoryTierStore {
        &self.inner
    }

    pub fn set_fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    /// Moves never complete; callers must time out
    pub fn set_hang_moves(&self, hang: bool) {
        self.hang_moves.store(hang, Ordering::SeqCst);
    }

    pub fn set_fail_stores(&self, fail: bool) {
        self.fail_stores.store(fail, Ordering::SeqCst);
    }

    pub fn move_calls(&self) -> u64 {
        self.move_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TierStore for FlakyStore {
    async fn store_physical(&self, item_id: ItemId, tier: StorageTier) -> Result<(), StoreError> {
        if self.fail_stores.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted store failure".to_string()));
        }
        self.inner.store_physical(item_id, tier).await
    }

    async fn move_physical(
        &self,
        item_id: ItemId,
        from: StorageTier,
        to: StorageTier,
    ) -> Result<(), StoreError> {
        self.move_calls.fetch_add(1, Ordering::SeqCst);

        if self.hang_moves.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_moves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("scripted move failure".to_string()));
        }
        self.inner.move_physical(item_id, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::fetch_signals;
    use uuid::Uuid;

    fn item_ref(id: ItemId) -> ItemRef {
        ItemRef {
            id,
            owner_id: "user-1".to_string(),
            context_id: "conv-1".to_string(),
        }
    }

    #[tokio::test]
    async fn scripted_signals_answer_and_fail() {
        let signals = ScriptedSignals::new();
        let id = Uuid::new_v4();
        signals.set(id, 0.8, 0.2);

        let reading = fetch_signals(&signals, &item_ref(id), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reading.relevance, 0.8);
        assert_eq!(signals.calls(), 2);

        signals.set_unavailable(true);
        let err = fetch_signals(&signals, &item_ref(id), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::Unavailable(_)));
    }

    #[tokio::test]
    async fn flaky_store_fails_on_demand() {
        let store = FlakyStore::new();
        let id = Uuid::new_v4();
        store.store_physical(id, StorageTier::Warm).await.unwrap();

        store.set_fail_moves(true);
        assert!(
            store
                .move_physical(id, StorageTier::Warm, StorageTier::Hot)
                .await
                .is_err()
        );
        assert_eq!(store.inner().tier_of(id), Some(StorageTier::Warm));

        store.set_fail_moves(false);
        store
            .move_physical(id, StorageTier::Warm, StorageTier::Hot)
            .await
            .unwrap();
        assert_eq!(store.move_calls(), 2);
    }
}
