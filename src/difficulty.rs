//! Difficulty control
//!
//! Maps flow state to a difficulty level: boredom to medium, anxiety to easy and
//! flow to hard. The controller remembers the last level it assigned and keeps
//! it when an update arrives as a failure, so a transient scoring error skips
//! one update instead of resetting difficulty.

use crate::error::GazeError;
use crate::types::{DifficultyLevel, FlowState};
use tracing::{debug, warn};

/// Level assigned before the first successful update
pub const INITIAL_DIFFICULTY: DifficultyLevel = DifficultyLevel::Medium;

/// Single-slot difficulty memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyController {
    level: DifficultyLevel,
}

impl Default for DifficultyController {
    fn default() -> Self {
        Self::new(INITIAL_DIFFICULTY)
    }
}

impl DifficultyController {
    pub fn new(initial: DifficultyLevel) -> Self {
        Self { level: initial }
    }

    /// Difficulty for a flow state
    pub fn level_for(flow_state: FlowState) -> DifficultyLevel {
        match flow_state {
            FlowState::Boredom => DifficultyLevel::Medium,
            FlowState::Anxiety => DifficultyLevel::Easy,
            FlowState::Flow => DifficultyLevel::Hard,
        }
    }

    /// Apply a classification outcome and return the level now in effect
    pub fn apply(&mut self, outcome: Result<FlowState, &GazeError>) -> DifficultyLevel {
        match outcome {
            Ok(flow_state) => {
                let level = Self::level_for(flow_state);
                if level != self.level {
                    debug!(
                        from = self.level.as_str(),
                        to = level.as_str(),
                        flow_state = flow_state.as_str(),
                        "Difficulty changed"
                    );
                }
                self.level = level;
            }
            Err(e) => {
                warn!(
                    kind = e.kind(),
                    retained = self.level.as_str(),
                    "Classification failed, keeping previous difficulty"
                );
            }
        }
        self.level
    }

    pub fn level(&self) -> DifficultyLevel {
        self.level
    }
}
