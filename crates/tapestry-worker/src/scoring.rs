//! Engagement-based impact score.

use chrono::{DateTime, Utc};
use tapestry_models::EngagementCounters;

use crate::error::{WorkerError, WorkerResult};

/// Recency sub-score of a post created today (or in the future).
pub const MAX_RECENCY: f64 = 365.0;

/// Linear weights of the impact score. They must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub digg: f64,
    pub comment: f64,
    pub share: f64,
    pub play: f64,
    pub recentness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            digg: 0.2,
            comment: 0.3,
            share: 0.2,
            play: 0.2,
            recentness: 0.1,
        }
    }
}

impl ScoringWeights {
    /// Read `IMPACT_WEIGHT_{DIGG,COMMENT,SHARE,PLAY,RECENTNESS}`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let weight = |key: &str, default: f64| {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        };

        Self {
            digg: weight("IMPACT_WEIGHT_DIGG", defaults.digg),
            comment: weight("IMPACT_WEIGHT_COMMENT", defaults.comment),
            share: weight("IMPACT_WEIGHT_SHARE", defaults.share),
            play: weight("IMPACT_WEIGHT_PLAY", defaults.play),
            recentness: weight("IMPACT_WEIGHT_RECENTNESS", defaults.recentness),
        }
    }

    fn as_array(&self) -> [f64; 5] {
        [self.digg, self.comment, self.share, self.play, self.recentness]
    }

    /// Reject negative weights and weights not summing to 1.0.
    pub fn validate(&self) -> WorkerResult<()> {
        let weights = self.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(WorkerError::config_error(format!(
                "impact weights must be non-negative: {:?}",
                self
            )));
        }

        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(WorkerError::config_error(format!(
                "impact weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// `365 / days` since `create_time`, with whole days floored. Posts less
/// than a day old score the maximum.
pub fn recency_score(create_time: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - create_time).num_days();
    if days < 1 {
        MAX_RECENCY
    } else {
        MAX_RECENCY / days as f64
    }
}

/// Weighted sum of engagement counters and recency.
pub fn impact_score(
    engagement: &EngagementCounters,
    create_time: DateTime<Utc>,
    now: DateTime<Utc>,
    weights: &ScoringWeights,
) -> f64 {
    weights.digg * engagement.digg_count as f64
        + weights.comment * engagement.comment_count as f64
        + weights.share * engagement.share_count as f64
        + weights.play * engagement.play_count as f64
        + weights.recentness * recency_score(create_time, now)
}
