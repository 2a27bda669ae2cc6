//! Error types for Mnemo retention
//!
//! `RetentionError` is the crate-wide error. The external boundaries (physical
//! store, relevance classifier) and the migration path carry their own error
//! enums so callers can tell a recoverable tier move failure apart from a
//! caller mistake such as an unknown item id.

use thiserror::Error;
use uuid::Uuid;

use crate::memory::types::StorageTier;

/// Main error type for retention engine operations
#[derive(Error, Debug)]
pub enum RetentionError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The item is not tracked by the engine
    #[error("Item not found: {0}")]
    ItemNotFound(Uuid),

    /// Caller supplied an invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The external physical store rejected an operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A tier migration failed and was rolled back
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    /// The external relevance classifier could not be reached
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Admin server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A background engine task panicked or was aborted
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by a [`TierStore`](crate::storage::TierStore) implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store has no payload for this item
    #[error("item {0} is not present in the store")]
    Missing(Uuid),

    /// The store holds the item in a different tier than expected
    #[error("item {item_id} is in {actual} in the store, expected {expected}")]
    Conflict {
        item_id: Uuid,
        expected: StorageTier,
        actual: StorageTier,
    },

    /// Any other backend failure
    #[error("{0}")]
    Backend(String),
}

/// Errors reported by a [`SignalSource`](crate::signals::SignalSource) implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    /// The classifier did not answer (down, overloaded, timed out)
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The classifier has no signal for this item
    #[error("no signal for item {0}")]
    UnknownItem(Uuid),
}

impl From<SignalError> for RetentionError {
    fn from(e: SignalError) -> Self {
        RetentionError::ClassifierUnavailable(e.to_string())
    }
}

/// Reasons a single tier migration did not happen
///
/// Every variant leaves the item in its prior tier with the engine's
/// bookkeeping unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    /// The destination tier has no free slot
    #[error("capacity exceeded in {0} tier")]
    CapacityExceeded(StorageTier),

    /// The item was not in the tier the caller expected
    #[error("tier mismatch for {item_id}: expected {expected}, found {actual}")]
    TierMismatch {
        item_id: Uuid,
        expected: StorageTier,
        actual: StorageTier,
    },

    /// Another migration of the same item is in progress
    #[error("migration already in flight for {0}")]
    InFlight(Uuid),

    /// The item is not (or no longer) tracked
    #[error("item not found: {0}")]
    ItemNotFound(Uuid),

    /// The physical move failed
    #[error("physical move failed: {0}")]
    Store(StoreError),

    /// The physical move did not finish within the configured timeout
    #[error("physical move timed out after {0} ms")]
    Timeout(u64),
}

/// Result type alias for retention operations
pub type Result<T> = std::result::Result<T, RetentionError>;
