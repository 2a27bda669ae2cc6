//! Access pattern tracking
//!
//! Records every touch of an item and derives the recency and frequency
//! signals the optimizer consumes. Records live in a `DashMap` with one
//! mutex per item, so concurrent conversational turns touching different
//! items never contend on a shared lock.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::memory::types::ItemId;

/// Default number of retrieval latencies kept per item
pub const DEFAULT_LATENCY_WINDOW: usize = 100;

/// Running access statistics for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Owner of the item, used for per-owner interaction tracking
    pub owner_id: String,
    /// Total number of accesses
    pub access_count: u64,
    /// When the record was created (first store)
    pub first_accessed_at: DateTime<Utc>,
    /// Most recent access
    pub last_accessed_at: DateTime<Utc>,
    /// Most recent retrieval latencies in milliseconds, oldest first
    pub latencies_ms: VecDeque<f64>,
    /// Reads served from the item's current tier
    pub hits: u64,
    /// Reads that missed and had to go further
    pub misses: u64,
    /// `access_count / max(1, days since first access)`
    pub access_frequency: f64,
    #[serde(skip)]
    latency_window: usize,
}

impl AccessRecord {
    fn new(owner_id: String, now: DateTime<Utc>, latency_window: usize) -> Self {
        Self {
            owner_id,
            access_count: 0,
            first_accessed_at: now,
            last_accessed_at: now,
            latencies_ms: VecDeque::with_capacity(latency_window.min(DEFAULT_LATENCY_WINDOW)),
            hits: 0,
            misses: 0,
            access_frequency: 0.0,
            latency_window: latency_window.max(1),
        }
    }

    fn observe(&mut self, timestamp: DateTime<Utc>, latency_ms: f64, was_hit: bool) {
        self.access_count += 1;
        if timestamp > self.last_accessed_at {
            self.last_accessed_at = timestamp;
        }

        if latency_ms.is_finite() && latency_ms >= 0.0 {
            if self.latencies_ms.len() == self.latency_window {
                self.latencies_ms.pop_front();
            }
            self.latencies_ms.push_back(latency_ms);
        }

        if was_hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }

        let days = (timestamp - self.first_accessed_at).num_days().max(1);
        self.access_frequency = self.access_count as f64 / days as f64;
    }

    /// Mean of the buffered latencies
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        Some(self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64)
    }

    /// Fraction of accesses that were hits, `None` before the first access
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.hits + self.misses;
        (total > 0).then(|| self.hits as f64 / total as f64)
    }
}

/// Interaction history of one owner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnerActivity {
    /// Accesses plus item creations for this owner
    pub interactions: u64,
    pub last_interaction_at: DateTime<Utc>,
}

/// Per-item access tracker
///
/// The sole writer of [`AccessRecord`]s. Also keeps a per-owner interaction
/// counter that feeds relationship depth and the recency bonus.
#[derive(Debug)]
pub struct AccessTracker {
    records: DashMap<ItemId, Arc<Mutex<AccessRecord>>>,
    owners: DashMap<String, OwnerActivity>,
    latency_window: usize,
}

impl AccessTracker {
    pub fn new(latency_window: usize) -> Self {
        Self {
            records: DashMap::new(),
            owners: DashMap::new(),
            latency_window: latency_window.max(1),
        }
    }

    /// Create the record for a newly stored item
    ///
    /// Storing an item counts as an interaction with its owner.
    pub fn register(&self, item_id: ItemId, owner_id: &str, now: DateTime<Utc>) {
        self.records.entry(item_id).or_insert_with(|| {
            Arc::new(Mutex::new(AccessRecord::new(
                owner_id.to_string(),
                now,
                self.latency_window,
            )))
        });
        self.touch_owner(owner_id, now);
    }

    /// Record one access of an item
    ///
    /// Returns the updated record, or `None` if the item was never
    /// registered.
    pub fn record_access(
        &self,
        item_id: ItemId,
        timestamp: DateTime<Utc>,
        retrieval_latency_ms: f64,
        was_hit: bool,
    ) -> Option<AccessRecord> {
        let record = self.records.get(&item_id).map(|r| Arc::clone(r.value()))?;

        let (snapshot, owner_id) = {
            let mut record = record.lock();
            record.observe(timestamp, retrieval_latency_ms, was_hit);
            (record.clone(), record.owner_id.clone())
        };
        self.touch_owner(&owner_id, timestamp);

        tracing::trace!(
            item_id = %item_id,
            access_count = snapshot.access_count,
            latency_ms = retrieval_latency_ms,
            was_hit,
            "Recorded access"
        );

        Some(snapshot)
    }

    /// Current statistics for an item
    pub fn get_stats(&self, item_id: ItemId) -> Option<AccessRecord> {
        let record = self.records.get(&item_id).map(|r| Arc::clone(r.value()))?;
        let snapshot = record.lock().clone();
        Some(snapshot)
    }

    /// Interaction history for an owner
    pub fn owner_activity(&self, owner_id: &str) -> Option<OwnerActivity> {
        self.owners.get(owner_id).map(|a| *a.value())
    }

    /// Drop the record of an item the caller deleted
    pub fn forget(&self, item_id: ItemId) -> bool {
        self.records.remove(&item_id).is_some()
    }

    /// Number of items with a record
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn touch_owner(&self, owner_id: &str, at: DateTime<Utc>) {
        self.owners
            .entry(owner_id.to_string())
            .and_modify(|activity| {
                activity.interactions += 1;
                if at > activity.last_interaction_at {
                    activity.last_interaction_at = at;
                }
            })
            .or_insert(OwnerActivity {
                interactions: 1,
                last_interaction_at: at,
            });
    }
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn tracker_with_item() -> (AccessTracker, ItemId, DateTime<Utc>) {
        let tracker = AccessTracker::default();
        let id = Uuid::new_v4();
        let now = Utc::now();
        tracker.register(id, "user-1", now);
        (tracker, id, now)
    }

    #[test]
    fn test_register_creates_empty_record() {
        let (tracker, id, now) = tracker_with_item();
        let stats = tracker.get_stats(id).unwrap();
        assert_eq!(stats.access_count, 0);
        assert_eq!(stats.first_accessed_at, now);
        assert!(stats.hit_rate().is_none());
        assert!(stats.average_latency_ms().is_none());
    }

    #[test]
    fn test_record_access_updates_counters() {
        let (tracker, id, now) = tracker_with_item();
        let later = now + Duration::minutes(5);

        tracker.record_access(id, later, 12.0, true).unwrap();
        let stats = tracker.record_access(id, later, 8.0, false).unwrap();

        assert_eq!(stats.access_count, 2);
        assert_eq!(stats.last_accessed_at, later);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.average_latency_ms(), Some(10.0));
        assert_eq!(stats.hit_rate(), Some(0.5));
    }

    #[test]
    fn test_unknown_item_is_none() {
        let tracker = AccessTracker::default();
        assert!(
            tracker
                .record_access(Uuid::new_v4(), Utc::now(), 1.0, true)
                .is_none()
        );
    }

    #[test]
    fn test_latency_ring_buffer_is_capped() {
        let tracker = AccessTracker::new(3);
        let id = Uuid::new_v4();
        let now = Utc::now();
        tracker.register(id, "user-1", now);

        for latency in [1.0, 2.0, 3.0, 4.0, 5.0] {
            tracker.record_access(id, now, latency, true);
        }

        let stats = tracker.get_stats(id).unwrap();
        assert_eq!(stats.latencies_ms.len(), 3);
        assert_eq!(stats.latencies_ms.front(), Some(&3.0));
        assert_eq!(stats.average_latency_ms(), Some(4.0));
        assert_eq!(stats.access_count, 5);
    }

    #[test]
    fn test_invalid_latency_not_buffered() {
        let (tracker, id, now) = tracker_with_item();
        let stats = tracker.record_access(id, now, f64::NAN, true).unwrap();
        assert_eq!(stats.access_count, 1);
        assert!(stats.latencies_ms.is_empty());
    }

    #[test]
    fn test_access_frequency_per_day() {
        let (tracker, id, now) = tracker_with_item();

        // Same day: divided by the floor of one day
        let stats = tracker.record_access(id, now, 1.0, true).unwrap();
        assert_eq!(stats.access_frequency, 1.0);

        // Four days later, two accesses total
        let stats = tracker
            .record_access(id, now + Duration::days(4), 1.0, true)
            .unwrap();
        assert_eq!(stats.access_frequency, 0.5);
    }

    #[test]
    fn test_out_of_order_timestamp_keeps_latest() {
        let (tracker, id, now) = tracker_with_item();
        let later = now + Duration::hours(2);
        tracker.record_access(id, later, 1.0, true);
        let stats = tracker.record_access(id, now, 1.0, true).unwrap();
        assert_eq!(stats.last_accessed_at, later);
    }

    #[test]
    fn test_owner_activity_counts_creation_and_access() {
        let (tracker, id, now) = tracker_with_item();
        let later = now + Duration::hours(1);
        tracker.record_access(id, later, 1.0, true);

        let activity = tracker.owner_activity("user-1").unwrap();
        assert_eq!(activity.interactions, 2);
        assert_eq!(activity.last_interaction_at, later);
        assert!(tracker.owner_activity("someone-else").is_none());
    }

    #[test]
    fn test_forget_removes_record() {
        let (tracker, id, _) = tracker_with_item();
        assert_eq!(tracker.len(), 1);
        assert!(tracker.forget(id));
        assert!(tracker.is_empty());
        assert!(tracker.get_stats(id).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let tracker = Arc::new(AccessTracker::default());
        let id = Uuid::new_v4();
        tracker.register(id, "user-1", Utc::now());

        let mut handles = vec![];
        for i in 0..100 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.record_access(id, Utc::now(), i as f64, i % 2 == 0);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = tracker.get_stats(id).unwrap();
        assert_eq!(stats.access_count, 100);
        assert_eq!(stats.hits + stats.misses, 100);
        assert_eq!(stats.latencies_ms.len(), 100);
    }
}
