//! Memory types for the retention engine
//!
//! Defines the tracked item (the engine's view of a stored fact or
//! conversational record) and the storage tier enum. Payload bytes live in
//! the external store; the engine only owns placement and scoring metadata.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a tracked item
pub type ItemId = Uuid;

/// Storage tier indicating access frequency and retention priority
///
/// Ordered from hottest to coldest, so `Hot < Warm < Cold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    /// Frequently needed, fastest retrieval, small fixed capacity
    Hot,
    /// Occasionally needed, moderate capacity
    Warm,
    /// Archive; unbounded, the terminal resting tier
    Cold,
}

impl StorageTier {
    /// All tiers, hottest first
    pub const ALL: [StorageTier; 3] = [StorageTier::Hot, StorageTier::Warm, StorageTier::Cold];

    /// Position in the hot-to-cold ordering (Hot = 0)
    pub fn rank(self) -> usize {
        match self {
            StorageTier::Hot => 0,
            StorageTier::Warm => 1,
            StorageTier::Cold => 2,
        }
    }

    /// The next tier down, or `None` for Cold
    pub fn colder(self) -> Option<StorageTier> {
        match self {
            StorageTier::Hot => Some(StorageTier::Warm),
            StorageTier::Warm => Some(StorageTier::Cold),
            StorageTier::Cold => None,
        }
    }

    /// True if `self` sits below `other`
    pub fn is_colder_than(self, other: StorageTier) -> bool {
        self.rank() > other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageTier::Hot => "hot",
            StorageTier::Warm => "warm",
            StorageTier::Cold => "cold",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(StorageTier::Hot),
            "warm" => Ok(StorageTier::Warm),
            "cold" => Ok(StorageTier::Cold),
            other => Err(format!("Unknown tier: {other}. Use hot, warm, or cold.")),
        }
    }
}

/// A knowledge item tracked by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Unique identifier for this item
    pub id: ItemId,
    /// User the item belongs to
    pub owner_id: String,
    /// Conversation or context the item came from
    pub context_id: String,
    /// Which storage tier this item is in
    pub tier: StorageTier,
    /// Composite retention score in [0, 1]
    pub score: f64,
    /// When the item was first stored
    pub created_at: DateTime<Utc>,
    /// When the item was last read or written
    pub last_accessed_at: DateTime<Utc>,
    /// How many times the item has been accessed
    pub access_count: u64,
    /// When the item entered its current tier
    pub tier_assigned_at: DateTime<Utc>,
}

impl TrackedItem {
    /// Create a newly stored item placed in `tier`
    pub fn new(
        owner_id: impl Into<String>,
        context_id: impl Into<String>,
        tier: StorageTier,
        score: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            context_id: context_id.into(),
            tier,
            score: score.clamp(0.0, 1.0),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            tier_assigned_at: now,
        }
    }

    /// Borrowed identity handed to external collaborators
    pub fn item_ref(&self) -> ItemRef {
        ItemRef {
            id: self.id,
            owner_id: self.owner_id.clone(),
            context_id: self.context_id.clone(),
        }
    }
}

/// Identity of an item as seen by external collaborators
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: ItemId,
    pub owner_id: String,
    pub context_id: String,
}

/// Read-only view of an item with its access statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    #[serde(flatten)]
    pub item: TrackedItem,
    /// Exempt from decay-driven demotion
    pub protected: bool,
    /// Score was computed from cached signals because the classifier was down
    pub stale_score: bool,
    /// Last relevance signal seen
    pub relevance: f64,
    /// Last emotional-weight signal seen
    pub emotional_weight: f64,
    /// Accesses per day since first access
    pub access_frequency: f64,
    /// Mean of the recent retrieval latencies, if any were recorded
    pub avg_retrieval_latency_ms: Option<f64>,
    pub hits: u64,
    pub misses: u64,
}
