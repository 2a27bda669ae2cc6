//! Relevance signals from the external classifier
//!
//! The engine does not compute relevance or emotional weight itself. It asks
//! a [`SignalSource`], bounds every call with a timeout, and falls back to the
//! last-known values when the classifier cannot answer.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SignalError;
use crate::memory::types::{ItemId, ItemRef};
use crate::memory::weight::clamp_unit;

/// One pair of classifier signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub relevance: f64,
    pub emotional_weight: f64,
}

/// External classifier producing per-item signals
#[async_trait]
pub trait SignalSource: Send + Sync + std::fmt::Debug {
    async fn get_relevance(&self, item: &ItemRef) -> Result<f64, SignalError>;

    async fn get_emotional_weight(&self, item: &ItemRef) -> Result<f64, SignalError>;
}

/// Fetch both signals for an item, giving up after `timeout`
pub async fn fetch_signals(
    source: &dyn SignalSource,
    item: &ItemRef,
    timeout: Duration,
) -> Result<SignalReading, SignalError> {
    let fetch = async {
        let (relevance, emotional_weight) = tokio::try_join!(
            source.get_relevance(item),
            source.get_emotional_weight(item)
        )?;
        Ok(SignalReading {
            relevance: clamp_unit(relevance),
            emotional_weight: clamp_unit(emotional_weight),
        })
    };

    match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(SignalError::Unavailable(format!(
            "no answer within {} ms",
            timeout.as_millis()
        ))),
    }
}

/// Signal source fed by the host
///
/// For deployments where the classifier pushes scores in rather than being
/// polled. Items with no pushed reading report [`SignalError::UnknownItem`].
#[derive(Debug, Default)]
pub struct PushedSignals {
    readings: DashMap<ItemId, SignalReading>,
}

impl PushedSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item_id: ItemId, reading: SignalReading) {
        self.readings.insert(item_id, reading);
    }

    pub fn remove(&self, item_id: ItemId) -> Option<SignalReading> {
        self.readings.remove(&item_id).map(|(_, r)| r)
    }

    pub fn get(&self, item_id: ItemId) -> Option<SignalReading> {
        self.readings.get(&item_id).map(|r| *r.value())
    }

    fn reading(&self, item: &ItemRef) -> Result<SignalReading, SignalError> {
        self.get(item.id).ok_or(SignalError::UnknownItem(item.id))
    }
}

#[async_trait]
impl SignalSource for PushedSignals {
    async fn get_relevance(&self, item: &ItemRef) -> Result<f64, SignalError> {
        self.reading(item).map(|r| r.relevance)
    }

    async fn get_emotional_weight(&self, item: &ItemRef) -> Result<f64, SignalError> {
        self.reading(item).map(|r| r.emotional_weight)
    }
}
