//! Saccade/fixation event classification
//!
//! Velocity magnitudes are first passed through a single-pole recursive
//! low-pass filter (`y[i] = x[i] + a * y[i-1]`), then segmented by a three
//! state machine:
//!
//! - `Idle` opens a saccade run when the filtered magnitude exceeds the saccade
//!   threshold, a fixation run when it drops below the fixation threshold, and
//!   otherwise stays idle.
//! - A run extends while the magnitude stays on its side of its own threshold
//!   and closes the instant it does not; the closing index is then
//!   re-evaluated from `Idle`.
//! - Any run still open at the end of the sequence is closed at the boundary.

use crate::config::EngineConfig;
use crate::error::GazeError;
use crate::types::{Event, EventKind, EventSummary, VelocitySample};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    InSaccade { start: usize },
    InFixation { start: usize },
}

/// Velocity-threshold event classifier with hysteresis
#[derive(Debug, Clone, PartialEq)]
pub struct EventClassifier {
    saccade_threshold: f64,
    fixation_threshold: f64,
    filter_coefficient: f64,
}

impl EventClassifier {
    /// Create a classifier; `saccade_threshold` should exceed `fixation_threshold`
    pub fn new(saccade_threshold: f64, fixation_threshold: f64, filter_coefficient: f64) -> Self {
        Self {
            saccade_threshold,
            fixation_threshold,
            filter_coefficient,
        }
    }

    /// Build a classifier from validated configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.saccade_threshold,
            config.fixation_threshold,
            config.low_pass_filter_coefficient,
        )
    }

    pub fn saccade_threshold(&self) -> f64 {
        self.saccade_threshold
    }

    pub fn fixation_threshold(&self) -> f64 {
        self.fixation_threshold
    }

    /// Apply the recursive low-pass filter to the velocity magnitudes.
    ///
    /// Fails if the filter is unstable or any output is not finite.
    pub fn smooth(&self, velocities: &[VelocitySample]) -> Result<Vec<f64>, GazeError> {
        let a = self.filter_coefficient;
        if !a.is_finite() || a.abs() >= 1.0 {
            return Err(GazeError::ClassificationFailure(format!(
                "unstable low-pass filter coefficient {a}"
            )));
        }

        let mut filtered = Vec::with_capacity(velocities.len());
        let mut previous = 0.0;
        for (i, velocity) in velocities.iter().enumerate() {
            let value = velocity.magnitude + a * previous;
            if !value.is_finite() {
                return Err(GazeError::ClassificationFailure(format!(
                    "non-finite filtered magnitude at index {i}"
                )));
            }
            filtered.push(value.abs());
            previous = value;
        }
        Ok(filtered)
    }

    /// Segment a velocity sequence into saccade and fixation events.
    ///
    /// Events are ordered by `start_index` and never overlap. Empty input
    /// yields no events.
    pub fn classify(&self, velocities: &[VelocitySample]) -> Result<Vec<Event>, GazeError> {
        let filtered = self.smooth(velocities)?;
        Ok(self.segment(&filtered))
    }

    fn segment(&self, filtered: &[f64]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut state = RunState::Idle;

        for (i, &magnitude) in filtered.iter().enumerate() {
            state = match state {
                RunState::InSaccade { start } if magnitude > self.saccade_threshold => {
                    RunState::InSaccade { start }
                }
                RunState::InFixation { start } if magnitude < self.fixation_threshold => {
                    RunState::InFixation { start }
                }
                RunState::InSaccade { start } => {
                    events.push(make_event(EventKind::Saccade, start, i, filtered));
                    self.open(magnitude, i)
                }
                RunState::InFixation { start } => {
                    events.push(make_event(EventKind::Fixation, start, i, filtered));
                    self.open(magnitude, i)
                }
                RunState::Idle => self.open(magnitude, i),
            };
        }

        let end = filtered.len();
        match state {
            RunState::InSaccade { start } => {
                events.push(make_event(EventKind::Saccade, start, end, filtered))
            }
            RunState::InFixation { start } => {
                events.push(make_event(EventKind::Fixation, start, end, filtered))
            }
            RunState::Idle => {}
        }

        events
    }

    fn open(&self, magnitude: f64, index: usize) -> RunState {
        if magnitude > self.saccade_threshold {
            RunState::InSaccade { start: index }
        } else if magnitude < self.fixation_threshold {
            RunState::InFixation { start: index }
        } else {
            RunState::Idle
        }
    }
}

fn make_event(kind: EventKind, start: usize, end: usize, filtered: &[f64]) -> Event {
    Event {
        kind,
        start_index: start,
        end_index: end,
        velocities: filtered[start..end].to_vec(),
    }
}

/// Summarize a classification pass over `velocity_count` indices
pub fn summarize_events(events: &[Event], velocity_count: usize) -> EventSummary {
    let mut summary = EventSummary::default();
    let mut covered = 0;
    let mut fixation_span_total = 0;

    for event in events {
        covered += event.span();
        match event.kind {
            EventKind::Saccade => {
                summary.saccade_count += 1;
                summary.peak_saccade_velocity =
                    summary.peak_saccade_velocity.max(event.peak_velocity());
            }
            EventKind::Fixation => {
                summary.fixation_count += 1;
                fixation_span_total += event.span();
            }
        }
    }

    summary.idle_count = velocity_count.saturating_sub(covered);
    if summary.fixation_count > 0 {
        summary.mean_fixation_span = fixation_span_total as f64 / summary.fixation_count as f64;
    }
    summary
}
