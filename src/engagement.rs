//! Engagement scoring and flow-state classification
//!
//! Engagement is a weighted sum of mean gaze velocity and fixation duration:
//! `engagement = w_v * mean_velocity + w_f * fixation_duration`.
//! Scores strictly below 0.3 are boredom, strictly above 0.7 anxiety, and
//! everything in between (both bounds included) is flow.

use crate::config::{EngagementWeights, EngineConfig};
use crate::error::GazeError;
use crate::kinematics::KinematicsEngine;
use crate::types::{FlowState, Metrics, VelocitySample};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Engagement below this value is boredom
pub const BOREDOM_CEILING: f64 = 0.3;

/// Engagement above this value is anxiety
pub const ANXIETY_FLOOR: f64 = 0.7;

/// Result of one successful scoring pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub mean_velocity: f64,
    pub engagement: f64,
    pub flow_state: FlowState,
}

/// Scorer combining gaze metrics into an engagement level
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngagementScorer {
    weights: EngagementWeights,
}

impl EngagementScorer {
    pub fn new(weights: EngagementWeights) -> Self {
        Self { weights }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.engagement_weights)
    }

    pub fn weights(&self) -> EngagementWeights {
        self.weights
    }

    /// Weighted engagement score; non-finite inputs or results are a scoring failure
    pub fn engagement(&self, mean_velocity: f64, fixation_duration: f64) -> Result<f64, GazeError> {
        if !mean_velocity.is_finite() || !fixation_duration.is_finite() {
            return Err(GazeError::ScoringFailure(format!(
                "non-finite input (velocity={mean_velocity}, fixation_duration={fixation_duration})"
            )));
        }

        let score = self.weights.w_v * mean_velocity + self.weights.w_f * fixation_duration;
        if !score.is_finite() {
            return Err(GazeError::ScoringFailure(format!(
                "engagement overflowed to {score}"
            )));
        }
        Ok(score)
    }

    /// Map an engagement score onto a flow state
    pub fn classify(engagement: f64) -> FlowState {
        if engagement < BOREDOM_CEILING {
            FlowState::Boredom
        } else if engagement > ANXIETY_FLOOR {
            FlowState::Anxiety
        } else {
            FlowState::Flow
        }
    }

    /// Score a pass from its velocity sequence and metrics
    pub fn evaluate(
        &self,
        velocities: &[VelocitySample],
        metrics: &Metrics,
    ) -> Result<Assessment, GazeError> {
        let mean_velocity = KinematicsEngine::mean_magnitude(velocities)
            .ok_or_else(|| GazeError::InsufficientSamples("no velocity samples to score".into()))?;
        let engagement = self.engagement(mean_velocity, metrics.fixation_duration)?;

        Ok(Assessment {
            mean_velocity,
            engagement,
            flow_state: Self::classify(engagement),
        })
    }

    /// Flow state for a pass, failing open to `Flow` when scoring fails
    pub fn assess(&self, velocities: &[VelocitySample], metrics: &Metrics) -> FlowState {
        match self.evaluate(velocities, metrics) {
            Ok(assessment) => assessment.flow_state,
            Err(e) => {
                log_scoring_failure(&e);
                FlowState::Flow
            }
        }
    }
}

/// Share of velocity samples strictly above `threshold`, in `[0, 1]`.
///
/// `None` when there are no velocities to score.
pub fn attention_score(velocities: &[VelocitySample], threshold: f64) -> Option<f64> {
    if velocities.is_empty() {
        return None;
    }
    let attentive = velocities.iter().filter(|v| v.magnitude > threshold).count();
    Some(attentive as f64 / velocities.len() as f64)
}

/// Log a failed scoring pass; an empty window is routine and stays at debug
pub(crate) fn log_scoring_failure(e: &GazeError) {
    match e {
        GazeError::InsufficientSamples(_) => {
            debug!(error = %e, "Nothing to score yet, assuming flow");
        }
        _ => {
            error!(kind = e.kind(), error = %e, "Engagement scoring failed, assuming flow");
        }
    }
}
