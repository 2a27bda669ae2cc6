//! Mnemo Retention - tiered memory retention engine
//!
//! Keeps per-user knowledge items for a conversational companion in Hot,
//! Warm or Cold storage according to a composite relevance score that
//! changes with time and use. The engine scores, places, decays and
//! migrates items; the signals and the payload store are external.

pub mod admin;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod optimizer;
pub mod signals;
pub mod storage;
pub mod testing;

pub use engine::{Placement, RetentionEngine};
pub use error::RetentionError;
