//! Relevance scoring for retention priority
//!
//! Combines the external relevance and emotional-weight signals with the
//! engine's own relationship-depth and recency signals into one composite
//! score in [0, 1]. Everything here is pure and deterministic.

use chrono::{DateTime, Duration, Utc};

/// Weight of the classifier's relevance signal
pub const RELEVANCE_WEIGHT: f64 = 0.6;
/// Weight of the classifier's emotional-weight signal
pub const EMOTIONAL_WEIGHT: f64 = 0.2;
/// Weight of the owner relationship depth
pub const RELATIONSHIP_WEIGHT: f64 = 0.15;
/// Weight of the owner recency bonus
pub const RECENCY_WEIGHT: f64 = 0.05;

/// Steepness of the recency curve over its window
pub const RECENCY_STEEPNESS: f64 = 3.0;
/// Interaction count at which relationship depth reaches ~63%
pub const RELATIONSHIP_SATURATION: f64 = 50.0;

/// Default window over which the recency bonus falls to zero
pub const DEFAULT_RECENCY_WINDOW_HOURS: i64 = 24;

/// The four signals a composite score is built from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreInputs {
    pub relevance: f64,
    pub emotional_weight: f64,
    pub relationship_depth: f64,
    pub recency_bonus: f64,
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Composite retention score
///
/// `0.6·relevance + 0.2·emotional_weight + 0.15·relationship_depth + 0.05·recency_bonus`,
/// each input clamped to [0, 1] and the result clamped again.
pub fn score(
    relevance: f64,
    emotional_weight: f64,
    relationship_depth: f64,
    recency_bonus: f64,
) -> f64 {
    let combined = RELEVANCE_WEIGHT * clamp_unit(relevance)
        + EMOTIONAL_WEIGHT * clamp_unit(emotional_weight)
        + RELATIONSHIP_WEIGHT * clamp_unit(relationship_depth)
        + RECENCY_WEIGHT * clamp_unit(recency_bonus);
    clamp_unit(combined)
}

/// Recency bonus for time elapsed since the owner's last interaction
///
/// Exponential in shape, rescaled so it is exactly 1 at zero elapsed time and
/// exactly 0 once the window has passed.
pub fn recency_bonus(elapsed: Duration, window: Duration) -> f64 {
    let window_ms = window.num_milliseconds();
    if window_ms <= 0 {
        return 0.0;
    }
    let elapsed_ms = elapsed.num_milliseconds().max(0);
    if elapsed_ms >= window_ms {
        return 0.0;
    }

    let t = elapsed_ms as f64 / window_ms as f64;
    let floor = (-RECENCY_STEEPNESS).exp();
    clamp_unit(((-RECENCY_STEEPNESS * t).exp() - floor) / (1.0 - floor))
}

/// Relationship depth from the number of interactions with an owner
pub fn relationship_depth(interactions: u64) -> f64 {
    clamp_unit(1.0 - (-(interactions as f64) / RELATIONSHIP_SATURATION).exp())
}

/// Scorer bound to a recency window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceScorer {
    recency_window: Duration,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_RECENCY_WINDOW_HOURS))
    }
}

impl RelevanceScorer {
    pub fn new(recency_window: Duration) -> Self {
        Self { recency_window }
    }

    pub fn recency_window(&self) -> Duration {
        self.recency_window
    }

    pub fn score(&self, inputs: &ScoreInputs) -> f64 {
        score(
            inputs.relevance,
            inputs.emotional_weight,
            inputs.relationship_depth,
            inputs.recency_bonus,
        )
    }

    /// Recency bonus at `now` for an owner last seen at `last_interaction`
    pub fn recency_bonus(
        &self,
        last_interaction: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> f64 {
        match last_interaction {
            Some(at) => recency_bonus(now - at, self.recency_window),
            None => 0.0,
        }
    }
}
