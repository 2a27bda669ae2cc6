//! Tier placement: capacity, classification, decay and migration

pub mod capacity;
pub mod decay;
pub mod memory_store;
pub mod migration;
pub mod tiers;

pub use capacity::{Admission, CapacityManager, CapacitySnapshot, TierCapacity};
pub use decay::{DecayEngine, DecayOutcome, DecayPolicy};
pub use memory_store::InMemoryTierStore;
pub use migration::{MigrationExecutor, TierStore};
pub use tiers::{
    CAPACITY_CONSTRAINED, Classification, Displacement, TierClassifier, TierOccupancy,
    TierThresholds,
};
