//! Decay protection registry
//!
//! Items a caller marks as protected keep their score and tier through decay.
//! Protection only blocks downward movement; a protected item still rises to
//! a hotter tier when fresh signals raise its score.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::memory::types::ItemId;

/// A reasoned exemption from decay-driven demotion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionEntry {
    pub item_id: ItemId,
    /// Owner of the protected item, for per-owner listing
    pub owner_id: String,
    /// Free-form reason supplied by the caller
    pub reason: String,
    pub protected_since: DateTime<Utc>,
}

/// Registry of protected items
#[derive(Debug, Default)]
pub struct ProtectionRegistry {
    entries: DashMap<ItemId, ProtectionEntry>,
}

impl ProtectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protect an item, replacing the reason if it is already protected
    ///
    /// The original `protected_since` is kept when re-protecting.
    pub fn protect(
        &self,
        item_id: ItemId,
        owner_id: &str,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ProtectionEntry {
        let reason = reason.into();
        let entry = self
            .entries
            .entry(item_id)
            .and_modify(|entry| entry.reason = reason.clone())
            .or_insert_with(|| ProtectionEntry {
                item_id,
                owner_id: owner_id.to_string(),
                reason: reason.clone(),
                protected_since: now,
            })
            .clone();

        tracing::info!(item_id = %item_id, owner_id, reason = %entry.reason, "Item protected");
        entry
    }

    /// Remove protection; returns the removed entry if there was one
    pub fn unprotect(&self, item_id: ItemId) -> Option<ProtectionEntry> {
        let removed = self.entries.remove(&item_id).map(|(_, entry)| entry);
        if removed.is_some() {
            tracing::info!(item_id = %item_id, "Item unprotected");
        }
        removed
    }

    pub fn is_protected(&self, item_id: ItemId) -> bool {
        self.entries.contains_key(&item_id)
    }

    pub fn get(&self, item_id: ItemId) -> Option<ProtectionEntry> {
        self.entries.get(&item_id).map(|e| e.value().clone())
    }

    /// Protected items of one owner, oldest protection first
    pub fn list_protected(&self, owner_id: &str) -> Vec<ItemId> {
        let mut owned: Vec<(DateTime<Utc>, ItemId)> = self
            .entries
            .iter()
            .filter(|e| e.owner_id == owner_id)
            .map(|e| (e.protected_since, e.item_id))
            .collect();
        owned.sort();
        owned.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
