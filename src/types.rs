//! Core types for the Gazeflow pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw gaze samples, velocity samples, kinematic events, aggregate
//! metrics and the flow/difficulty classifications derived from them.

use crate::error::GazeError;
use serde::{Deserialize, Serialize};

/// A single gaze reading from the sensor (timestamp in seconds, position in pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeSample {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
}

impl GazeSample {
    /// Create a validated sample
    pub fn new(timestamp: f64, x: f64, y: f64) -> Result<Self, GazeError> {
        let sample = Self { timestamp, x, y };
        sample.validate()?;
        Ok(sample)
    }

    /// Reject samples carrying NaN or infinite fields
    pub fn validate(&self) -> Result<(), GazeError> {
        for (name, value) in [("timestamp", self.timestamp), ("x", self.x), ("y", self.y)] {
            if !value.is_finite() {
                return Err(GazeError::InvalidSample(format!(
                    "field `{name}` is not finite ({value})"
                )));
            }
        }
        Ok(())
    }

    /// Euclidean distance between two gaze positions
    pub fn distance_to(&self, other: &GazeSample) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Wire form of a gaze sample as delivered by a sensor collaborator.
///
/// Every field is optional so that malformed records can be rejected with a
/// precise reason instead of a generic parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawGazeSample {
    pub timestamp: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl TryFrom<RawGazeSample> for GazeSample {
    type Error = GazeError;

    fn try_from(raw: RawGazeSample) -> Result<Self, Self::Error> {
        let missing = |name: &str| GazeError::InvalidSample(format!("missing field `{name}`"));
        let timestamp = raw.timestamp.ok_or_else(|| missing("timestamp"))?;
        let x = raw.x.ok_or_else(|| missing("x"))?;
        let y = raw.y.ok_or_else(|| missing("y"))?;
        GazeSample::new(timestamp, x, y)
    }
}

/// Speed of the gaze over one inter-sample interval (pixels per second)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    /// Timestamp of the sample closing the interval
    pub timestamp: f64,
    pub magnitude: f64,
}

/// Kind of kinematic event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Saccade,
    Fixation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Saccade => "saccade",
            EventKind::Fixation => "fixation",
        }
    }
}

/// A closed run of velocity indices on one side of a threshold.
///
/// `start_index..end_index` is a half-open range into the velocity sequence;
/// `velocities` holds the filtered magnitudes of that range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub start_index: usize,
    pub end_index: usize,
    pub velocities: Vec<f64>,
}

impl Event {
    /// Number of velocity samples covered by the event
    pub fn span(&self) -> usize {
        self.end_index - self.start_index
    }

    /// Highest filtered magnitude within the event
    pub fn peak_velocity(&self) -> f64 {
        self.velocities.iter().copied().fold(0.0, f64::max)
    }

    /// Mean filtered magnitude within the event
    pub fn mean_velocity(&self) -> f64 {
        if self.velocities.is_empty() {
            return 0.0;
        }
        self.velocities.iter().sum::<f64>() / self.velocities.len() as f64
    }
}

/// Counts and shape statistics over one classification pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub saccade_count: usize,
    pub fixation_count: usize,
    /// Velocity indices that fell between the thresholds
    pub idle_count: usize,
    /// Mean fixation length in velocity samples
    pub mean_fixation_span: f64,
    /// Highest filtered magnitude seen inside any saccade
    pub peak_saccade_velocity: f64,
}

/// Aggregate gaze metrics for one pipeline pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean inter-sample interval (seconds)
    pub fixation_duration: f64,
    /// Mean per-step gaze speed (pixels per second)
    pub saccade_velocity: f64,
    /// Total elapsed time across the window (seconds)
    pub dwell_time: f64,
}

/// Flow-theory classification of the user's engagement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Boredom,
    Flow,
    Anxiety,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Boredom => "boredom",
            FlowState::Flow => "flow",
            FlowState::Anxiety => "anxiety",
        }
    }
}

/// Difficulty level requested from the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }
}

/// Which classifier most recently fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationSignal {
    VelocityThreshold,
    FlowTheory,
}

impl AdaptationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationSignal::VelocityThreshold => "velocity_threshold",
            AdaptationSignal::FlowTheory => "flow_theory",
        }
    }
}
