//! Shared user state
//!
//! `UserState` is the single record written by both the acquisition path and
//! the adaptation loop. It lives behind one lock owned by [`SharedUserState`];
//! callers only ever see copies.

use crate::difficulty::INITIAL_DIFFICULTY;
use crate::pipeline::PassReport;
use crate::signal::{SignalSelector, INITIAL_SIGNAL};
use crate::types::{AdaptationSignal, DifficultyLevel, FlowState, Metrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Latest view of the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    /// Most recent gaze speed (pixels per second)
    pub velocity: f64,
    /// Engagement from the last successful scoring pass
    pub engagement: Option<f64>,
    pub flow_state: FlowState,
    pub difficulty: DifficultyLevel,
    /// Signal of the classifier that most recently fired
    pub active_signal: AdaptationSignal,
    /// Metrics from the last pipeline pass
    pub metrics: Metrics,
    /// Completed adaptation ticks
    pub ticks: u64,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            velocity: 0.0,
            engagement: None,
            flow_state: FlowState::Flow,
            difficulty: INITIAL_DIFFICULTY,
            active_signal: INITIAL_SIGNAL,
            metrics: Metrics::default(),
            ticks: 0,
        }
    }
}

/// Clonable handle to the process-wide user state
#[derive(Debug, Clone, Default)]
pub struct SharedUserState {
    inner: Arc<Mutex<UserState>>,
}

impl SharedUserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> UserState {
        self.inner.lock().clone()
    }

    pub fn active_signal(&self) -> AdaptationSignal {
        self.inner.lock().active_signal
    }

    /// Fast-path update from a freshly acquired sample
    pub fn record_velocity(&self, velocity: f64, selector: &SignalSelector) -> AdaptationSignal {
        let mut state = self.inner.lock();
        state.velocity = velocity;
        state.active_signal = selector.select(state.active_signal, Some(velocity), None);
        state.active_signal
    }

    /// Fold a completed pipeline pass into the state.
    ///
    /// Returns the tick number and the signal that is active after the update.
    pub fn record_pass(
        &self,
        report: &PassReport,
        selector: &SignalSelector,
    ) -> (u64, AdaptationSignal) {
        let mut state = self.inner.lock();
        if let Some(velocity) = report.latest_velocity {
            state.velocity = velocity;
        }
        if report.engagement.is_some() {
            state.engagement = report.engagement;
        }
        state.flow_state = report.flow_state;
        state.difficulty = report.difficulty;
        state.metrics = report.metrics;
        state.active_signal =
            selector.select(state.active_signal, report.latest_velocity, report.engagement);
        state.ticks += 1;
        (state.ticks, state.active_signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report(latest_velocity: Option<f64>, engagement: Option<f64>) -> PassReport {
        PassReport {
            latest_velocity,
            engagement,
            flow_state: FlowState::Anxiety,
            difficulty: DifficultyLevel::Easy,
            ..PassReport::default()
        }
    }

    #[test]
    fn test_initial_state() {
        let state = SharedUserState::new().snapshot();
        assert_eq!(state.active_signal, AdaptationSignal::VelocityThreshold);
        assert_eq!(state.difficulty, DifficultyLevel::Medium);
        assert_eq!(state.ticks, 0);
    }

    #[test]
    fn test_record_velocity_fires_velocity_rule() {
        let shared = SharedUserState::new();
        let selector = SignalSelector::new(50.0, 0.5);
        shared.record_pass(&report(None, Some(0.9)), &selector);
        assert_eq!(shared.active_signal(), AdaptationSignal::FlowTheory);

        assert_eq!(
            shared.record_velocity(10.0, &selector),
            AdaptationSignal::FlowTheory
        );
        assert_eq!(
            shared.record_velocity(120.0, &selector),
            AdaptationSignal::VelocityThreshold
        );
        assert_eq!(shared.snapshot().velocity, 120.0);
    }

    #[test]
    fn test_record_pass_updates_state() {
        let shared = SharedUserState::new();
        let selector = SignalSelector::new(50.0, 0.5);

        let (tick, signal) = shared.record_pass(&report(Some(12.0), Some(0.9)), &selector);
        assert_eq!(tick, 1);
        assert_eq!(signal, AdaptationSignal::FlowTheory);

        let state = shared.snapshot();
        assert_eq!(state.velocity, 12.0);
        assert_eq!(state.engagement, Some(0.9));
        assert_eq!(state.flow_state, FlowState::Anxiety);
        assert_eq!(state.difficulty, DifficultyLevel::Easy);
    }

    #[test]
    fn test_failed_pass_keeps_last_engagement() {
        let shared = SharedUserState::new();
        let selector = SignalSelector::new(50.0, 0.5);
        shared.record_pass(&report(Some(12.0), Some(0.4)), &selector);
        let (tick, _) = shared.record_pass(&report(None, None), &selector);

        let state = shared.snapshot();
        assert_eq!(tick, 2);
        assert_eq!(state.engagement, Some(0.4));
        assert_eq!(state.velocity, 12.0);
    }
}
