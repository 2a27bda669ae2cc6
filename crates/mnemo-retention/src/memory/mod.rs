//! Memory types and per-item bookkeeping
//!
//! Defines tracked items, their scoring, access statistics, protection and
//! the engine's index of everything it tracks.

pub mod access;
pub mod index;
pub mod protection;
pub mod types;
pub mod weight;

pub use access::{AccessRecord, AccessTracker, DEFAULT_LATENCY_WINDOW, OwnerActivity};
pub use index::{CachedSignals, ItemEntry, ItemIndex, ItemSlot};
pub use protection::{ProtectionEntry, ProtectionRegistry};
pub use types::{ItemId, ItemRef, ItemSnapshot, StorageTier, TrackedItem};
pub use weight::{RelevanceScorer, ScoreInputs};
