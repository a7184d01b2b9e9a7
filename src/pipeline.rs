//! Pipeline orchestration
//!
//! One pass takes a snapshot of gaze samples through every stage:
//! kinematics → event classification → metric aggregation → engagement
//! scoring → difficulty control.
//!
//! A pass never fails as a whole. A stage that errors is recorded as a
//! [`StageFault`] on the report and the following stages run on whatever the
//! failed stage could still provide (no velocities, no events, fail-open
//! flow state).

use crate::classifier::{summarize_events, EventClassifier};
use crate::config::EngineConfig;
use crate::difficulty::{DifficultyController, INITIAL_DIFFICULTY};
use crate::engagement::{attention_score, log_scoring_failure, EngagementScorer};
use crate::error::GazeError;
use crate::kinematics::KinematicsEngine;
use crate::metrics::MetricsAggregator;
use crate::types::{
    DifficultyLevel, Event, EventSummary, FlowState, GazeSample, Metrics, VelocitySample,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

/// Pipeline stage a fault was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Kinematics,
    Classification,
    Scoring,
    Emission,
}

/// A stage failure recorded during a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFault {
    pub stage: Stage,
    pub kind: String,
    pub message: String,
}

impl StageFault {
    pub fn new(stage: Stage, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn from_error(stage: Stage, error: &GazeError) -> Self {
        Self::new(stage, error.kind(), error.to_string())
    }
}

/// Everything one pass produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub sample_count: usize,
    /// Index of the first sample scored; samples before the last degenerate
    /// interval are skipped
    pub window_start: usize,
    pub velocity_count: usize,
    /// Magnitude of the most recent velocity sample
    pub latest_velocity: Option<f64>,
    /// Indices are relative to the scored window's velocity sequence
    pub events: Vec<Event>,
    pub event_summary: EventSummary,
    pub metrics: Metrics,
    pub mean_velocity: Option<f64>,
    /// Share of velocities above the velocity threshold
    pub attention_score: Option<f64>,
    /// `None` when scoring failed
    pub engagement: Option<f64>,
    pub flow_state: FlowState,
    pub difficulty: DifficultyLevel,
    pub faults: Vec<StageFault>,
}

impl Default for PassReport {
    fn default() -> Self {
        Self {
            sample_count: 0,
            window_start: 0,
            velocity_count: 0,
            latest_velocity: None,
            events: Vec::new(),
            event_summary: EventSummary::default(),
            metrics: Metrics::default(),
            mean_velocity: None,
            attention_score: None,
            engagement: None,
            flow_state: FlowState::Flow,
            difficulty: INITIAL_DIFFICULTY,
            faults: Vec::new(),
        }
    }
}

impl PassReport {
    /// True when any stage recorded a fault
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }

    /// Faults raised by a given stage
    pub fn faults_in(&self, stage: Stage) -> impl Iterator<Item = &StageFault> {
        self.faults.iter().filter(move |f| f.stage == stage)
    }
}

/// Run a single pass over `samples` with a fresh difficulty controller.
///
/// # Example
/// ```ignore
/// let report = analyze_samples(&samples, &EngineConfig::default());
/// println!("{}", report.flow_state.as_str());
/// ```
pub fn analyze_samples(samples: &[GazeSample], config: &EngineConfig) -> PassReport {
    GazePipeline::new(config).process(samples)
}

/// Stateful pipeline for repeated passes.
///
/// The only state carried between passes is the difficulty controller's
/// last level.
#[derive(Debug, Clone)]
pub struct GazePipeline {
    classifier: EventClassifier,
    scorer: EngagementScorer,
    difficulty: DifficultyController,
    attention_threshold: f64,
}

impl Default for GazePipeline {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl GazePipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_parts(
            EventClassifier::from_config(config),
            EngagementScorer::from_config(config),
            DifficultyController::default(),
        )
        .with_attention_threshold(config.velocity_threshold)
    }

    pub fn with_parts(
        classifier: EventClassifier,
        scorer: EngagementScorer,
        difficulty: DifficultyController,
    ) -> Self {
        Self {
            classifier,
            scorer,
            difficulty,
            attention_threshold: EngineConfig::default().velocity_threshold,
        }
    }

    /// Speed above which a velocity sample counts towards attention
    pub fn with_attention_threshold(mut self, threshold: f64) -> Self {
        self.attention_threshold = threshold;
        self
    }

    /// Difficulty currently in effect
    pub fn difficulty(&self) -> DifficultyLevel {
        self.difficulty.level()
    }

    /// Run every stage over one sample snapshot
    pub fn process(&mut self, samples: &[GazeSample]) -> PassReport {
        let mut faults = Vec::new();

        // Stage 1: kinematics over the samples after the last degenerate interval
        let (window_start, velocities, degenerate) = trailing_velocities(samples);
        if let Some(e) = degenerate {
            debug!(
                kind = e.kind(),
                error = %e,
                window_start,
                "Scoring samples after degenerate interval"
            );
            faults.push(StageFault::from_error(Stage::Kinematics, &e));
        }
        let window = &samples[window_start..];

        // Stage 2: event classification
        let events = match self.classifier.classify(&velocities) {
            Ok(events) => events,
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Event classification failed");
                faults.push(StageFault::from_error(Stage::Classification, &e));
                Vec::new()
            }
        };
        let event_summary = summarize_events(&events, velocities.len());

        // Stage 3: metrics (each metric degrades to 0.0 on its own)
        let metrics = MetricsAggregator::aggregate(window);

        // Stage 4: engagement scoring, failing open to flow
        let assessment = self.scorer.evaluate(&velocities, &metrics);
        let (mean_velocity, engagement, flow_state) = match &assessment {
            Ok(a) => (Some(a.mean_velocity), Some(a.engagement), a.flow_state),
            Err(e) => {
                log_scoring_failure(e);
                faults.push(StageFault::from_error(Stage::Scoring, e));
                (
                    KinematicsEngine::mean_magnitude(&velocities),
                    None,
                    FlowState::Flow,
                )
            }
        };

        let attention_score = attention_score(&velocities, self.attention_threshold);

        // Stage 5: difficulty, retained on scoring failure
        let difficulty = self
            .difficulty
            .apply(assessment.as_ref().map(|a| a.flow_state));

        trace!(
            samples = samples.len(),
            window_start,
            velocities = velocities.len(),
            events = events.len(),
            flow_state = flow_state.as_str(),
            difficulty = difficulty.as_str(),
            "Pipeline pass complete"
        );

        PassReport {
            sample_count: samples.len(),
            window_start,
            velocity_count: velocities.len(),
            latest_velocity: velocities.last().map(|v| v.magnitude),
            events,
            event_summary,
            metrics,
            mean_velocity,
            attention_score,
            engagement,
            flow_state,
            difficulty,
            faults,
        }
    }
}

/// Velocities over the longest suffix of `samples` without a degenerate
/// interval, with the suffix start and the first error met on the way.
fn trailing_velocities(samples: &[GazeSample]) -> (usize, Vec<VelocitySample>, Option<GazeError>) {
    let mut start = 0;
    let mut first_error = None;
    loop {
        match KinematicsEngine::compute_velocities(&samples[start..]) {
            Ok(velocities) => return (start, velocities, first_error),
            Err(e) => {
                let restart = match &e {
                    GazeError::DegenerateInterval { index, .. } => Some(start + index),
                    _ => None,
                };
                first_error.get_or_insert(e);
                match restart {
                    Some(next) => start = next,
                    None => return (samples.len(), Vec::new(), first_error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngagementWeights;
    use crate::types::EventKind;
    use pretty_assertions::assert_eq;

    fn s(t: f64, x: f64, y: f64) -> GazeSample {
        GazeSample { timestamp: t, x, y }
    }

    /// Slow drift, a fast jump, then slow drift again (100 Hz)
    fn saccade_window() -> Vec<GazeSample> {
        let mut samples = Vec::new();
        let mut x = 100.0;
        for i in 0..10 {
            samples.push(s(i as f64 * 0.01, x, 200.0));
            x += 0.05;
        }
        for i in 10..13 {
            x += 5.0;
            samples.push(s(i as f64 * 0.01, x, 200.0));
        }
        for i in 13..20 {
            x += 0.05;
            samples.push(s(i as f64 * 0.01, x, 200.0));
        }
        samples
    }

    #[test]
    fn test_analyze_saccade_window() {
        let report = analyze_samples(&saccade_window(), &EngineConfig::default());

        assert_eq!(report.sample_count, 20);
        assert_eq!(report.velocity_count, 19);
        assert!(!report.is_degraded());
        assert_eq!(report.event_summary.saccade_count, 1);
        assert!(report.event_summary.fixation_count >= 1);
        assert!(report
            .events
            .iter()
            .any(|e| e.kind == EventKind::Saccade && e.peak_velocity() > 50.0));

        // Mean velocity in px/s dominates the weighted score
        assert_eq!(report.flow_state, FlowState::Anxiety);
        assert_eq!(report.difficulty, DifficultyLevel::Easy);
        assert!((report.metrics.fixation_duration - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_is_degraded_not_failed() {
        let report = analyze_samples(&[], &EngineConfig::default());

        assert_eq!(report.velocity_count, 0);
        assert!(report.events.is_empty());
        assert_eq!(report.flow_state, FlowState::Flow);
        assert_eq!(report.difficulty, INITIAL_DIFFICULTY);
        assert_eq!(report.engagement, None);
        assert_eq!(report.faults_in(Stage::Scoring).count(), 1);
        assert_eq!(report.faults_in(Stage::Kinematics).count(), 0);
    }

    #[test]
    fn test_degenerate_interval_recorded() {
        let samples = [s(0.0, 0.0, 0.0), s(0.1, 1.0, 0.0), s(0.1, 2.0, 0.0)];
        let report = analyze_samples(&samples, &EngineConfig::default());

        let kinematics: Vec<_> = report.faults_in(Stage::Kinematics).collect();
        assert_eq!(kinematics.len(), 1);
        assert_eq!(kinematics[0].kind, "degenerate_interval");
        assert!(report.events.is_empty());
        // Only the last sample follows the repeat, so nothing is left to measure
        assert_eq!(report.window_start, 2);
        assert_eq!(report.metrics, Metrics::default());
        assert_eq!(report.faults_in(Stage::Scoring).count(), 1);
    }

    #[test]
    fn test_repeated_timestamp_scores_samples_after_it() {
        let mut samples: Vec<_> = (0..41).map(|i| s(i as f64 * 0.01, i as f64, 0.0)).collect();
        samples[20].timestamp = samples[19].timestamp;
        let report = analyze_samples(&samples, &EngineConfig::default());

        let kinematics: Vec<_> = report.faults_in(Stage::Kinematics).collect();
        assert_eq!(kinematics.len(), 1);
        assert_eq!(kinematics[0].kind, "degenerate_interval");
        assert_eq!(report.window_start, 20);
        assert_eq!(report.velocity_count, 20);
        assert!(report.engagement.is_some());
        assert!(report.metrics.dwell_time > 0.0);
        assert_eq!(report.faults_in(Stage::Scoring).count(), 0);
    }

    #[test]
    fn test_attention_score_uses_velocity_threshold() {
        // 100 px/s everywhere: above a 50 px/s threshold, below a 150 px/s one
        let samples: Vec<_> = (0..10).map(|i| s(i as f64 * 0.01, i as f64, 0.0)).collect();
        let low = analyze_samples(&samples, &EngineConfig::default());
        assert_eq!(low.attention_score, Some(1.0));

        let config = EngineConfig {
            velocity_threshold: 150.0,
            ..EngineConfig::default()
        };
        assert_eq!(analyze_samples(&samples, &config).attention_score, Some(0.0));
        assert_eq!(analyze_samples(&[], &config).attention_score, None);
    }

    #[test]
    fn test_unstable_filter_is_classification_fault() {
        let config = EngineConfig {
            low_pass_filter_coefficient: 1.5,
            ..EngineConfig::default()
        };
        let samples: Vec<_> = (0..50).map(|i| s(i as f64 * 0.01, i as f64 * 50.0, 0.0)).collect();
        let mut pipeline = GazePipeline::with_parts(
            EventClassifier::from_config(&config),
            EngagementScorer::default(),
            DifficultyController::default(),
        );
        let report = pipeline.process(&samples);

        assert_eq!(report.faults_in(Stage::Classification).count(), 1);
        assert!(report.events.is_empty());
        // Scoring does not depend on classification
        assert!(report.engagement.is_some());
    }

    #[test]
    fn test_difficulty_retained_across_failed_pass() {
        let weights = EngagementWeights { w_v: 0.0, w_f: 5.0 };
        let mut pipeline = GazePipeline::with_parts(
            EventClassifier::new(50.0, 20.0, 0.0),
            EngagementScorer::new(weights),
            DifficultyController::default(),
        );

        // fixation_duration = 0.1 → engagement 0.5 → flow → hard
        let calm: Vec<_> = (0..5).map(|i| s(i as f64 * 0.1, 10.0, 10.0)).collect();
        assert_eq!(pipeline.process(&calm).difficulty, DifficultyLevel::Hard);

        let report = pipeline.process(&[s(0.0, 1.0, 1.0)]);
        assert!(report.is_degraded());
        assert_eq!(report.difficulty, DifficultyLevel::Hard);
        assert_eq!(pipeline.difficulty(), DifficultyLevel::Hard);
    }
}
