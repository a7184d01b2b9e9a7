//! Error types for Gazeflow

use thiserror::Error;

/// Errors that can occur while turning gaze samples into adaptation decisions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GazeError {
    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Degenerate interval at sample {index}: no time elapsed at t={timestamp}")]
    DegenerateInterval { index: usize, timestamp: f64 },

    #[error("Classification failure: {0}")]
    ClassificationFailure(String),

    #[error("Scoring failure: {0}")]
    ScoringFailure(String),

    #[error("Insufficient samples for computation: {0}")]
    InsufficientSamples(String),
}

impl GazeError {
    /// Stable tag for logs and fault records
    pub fn kind(&self) -> &'static str {
        match self {
            GazeError::InvalidSample(_) => "invalid_sample",
            GazeError::DegenerateInterval { .. } => "degenerate_interval",
            GazeError::ClassificationFailure(_) => "classification_failure",
            GazeError::ScoringFailure(_) => "scoring_failure",
            GazeError::InsufficientSamples(_) => "insufficient_samples",
        }
    }
}
