//! Engine configuration
//!
//! Configuration is read once at startup and handed to each component. A
//! missing required key or an out-of-range value is a fatal startup error;
//! nothing here is consulted again while the adaptation loop runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default sample buffer capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Default adaptation tick period in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Default capacity of the outbound signal channel
pub const DEFAULT_SIGNAL_CHANNEL_CAPACITY: usize = 64;

/// Keys that must be present in every configuration document
pub const REQUIRED_KEYS: [&str; 5] = [
    "velocity_threshold",
    "flow_threshold",
    "saccade_threshold",
    "fixation_threshold",
    "low_pass_filter_coefficient",
];

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required configuration key: {0}")]
    MissingField(String),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Weights of the engagement score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementWeights {
    /// Weight of mean gaze velocity
    pub w_v: f64,
    /// Weight of fixation duration
    pub w_f: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self { w_v: 0.5, w_f: 0.3 }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Gaze speed above which the velocity-threshold classifier fires (px/s)
    pub velocity_threshold: f64,
    /// Engagement above which the flow-theory classifier fires
    pub flow_threshold: f64,
    /// Filtered speed above which a saccade run opens (px/s)
    pub saccade_threshold: f64,
    /// Filtered speed below which a fixation run opens (px/s)
    pub fixation_threshold: f64,
    /// Feedback coefficient of the single-pole low-pass filter
    pub low_pass_filter_coefficient: f64,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub engagement_weights: EngagementWeights,
    #[serde(default = "default_signal_channel_capacity")]
    pub signal_channel_capacity: usize,
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_signal_channel_capacity() -> usize {
    DEFAULT_SIGNAL_CHANNEL_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: 50.0,
            flow_threshold: 0.5,
            saccade_threshold: 50.0,
            fixation_threshold: 20.0,
            low_pass_filter_coefficient: 0.0,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            engagement_weights: EngagementWeights::default(),
            signal_channel_capacity: DEFAULT_SIGNAL_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::Invalid("configuration must be a JSON object".into()))?;

        if let Some(key) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(ConfigError::MissingField((*key).to_string()));
        }

        let config: EngineConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges and cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("velocity_threshold", self.velocity_threshold),
            ("flow_threshold", self.flow_threshold),
            ("saccade_threshold", self.saccade_threshold),
            ("fixation_threshold", self.fixation_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }

        if self.saccade_threshold <= self.fixation_threshold {
            return Err(ConfigError::Invalid(format!(
                "saccade_threshold ({}) must be greater than fixation_threshold ({})",
                self.saccade_threshold, self.fixation_threshold
            )));
        }

        let coefficient = self.low_pass_filter_coefficient;
        if !(0.0..1.0).contains(&coefficient) {
            return Err(ConfigError::Invalid(format!(
                "low_pass_filter_coefficient must be in [0, 1), got {coefficient}"
            )));
        }

        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid("buffer_capacity must be positive".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".into()));
        }
        if self.signal_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "signal_channel_capacity must be positive".into(),
            ));
        }

        let weights = self.engagement_weights;
        if !weights.w_v.is_finite() || !weights.w_f.is_finite() {
            return Err(ConfigError::Invalid(
                "engagement_weights must be finite numbers".into(),
            ));
        }

        Ok(())
    }

    /// Adaptation tick period
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn minimal_json() -> &'static str {
        r#"{
            "velocity_threshold": 40.0,
            "flow_threshold": 0.6,
            "saccade_threshold": 50.0,
            "fixation_threshold": 10.0,
            "low_pass_filter_coefficient": 0.2
        }"#
    }

    #[test]
    fn test_defaults_applied() {
        let config = EngineConfig::from_json(minimal_json()).unwrap();
        assert_eq!(config.buffer_capacity, 100);
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.engagement_weights, EngagementWeights { w_v: 0.5, w_f: 0.3 });
        assert_eq!(config.tick_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_overrides() {
        let json = r#"{
            "velocity_threshold": 40.0,
            "flow_threshold": 0.6,
            "saccade_threshold": 50.0,
            "fixation_threshold": 10.0,
            "low_pass_filter_coefficient": 0.0,
            "buffer_capacity": 250,
            "tick_interval_ms": 20,
            "engagement_weights": { "w_v": 0.1, "w_f": 0.9 }
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.buffer_capacity, 250);
        assert_eq!(config.tick_interval_ms, 20);
        assert_eq!(config.engagement_weights.w_f, 0.9);
    }

    #[test]
    fn test_missing_required_key() {
        let json = r#"{
            "velocity_threshold": 40.0,
            "saccade_threshold": 50.0,
            "fixation_threshold": 10.0,
            "low_pass_filter_coefficient": 0.2
        }"#;
        match EngineConfig::from_json(json) {
            Err(ConfigError::MissingField(key)) => assert_eq!(key, "flow_threshold"),
            other => panic!("expected missing field, got {other:?}"),
        }
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let config = EngineConfig {
            saccade_threshold: 10.0,
            fixation_threshold: 10.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unstable_filter_rejected() {
        let config = EngineConfig {
            low_pass_filter_coefficient: 1.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = EngineConfig {
            buffer_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_not_an_object() {
        assert!(matches!(
            EngineConfig::from_json("[1, 2]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(minimal_json().as_bytes()).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.velocity_threshold, 40.0);

        let missing = EngineConfig::from_file("/nonexistent/gazeflow.json");
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_round_trip_through_json() {
        let config = EngineConfig::default();
        let json = config.to_json_pretty().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
