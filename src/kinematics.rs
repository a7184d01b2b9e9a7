//! Gaze kinematics
//!
//! Converts consecutive gaze samples into a sequence of speeds. A zero (or
//! negative) elapsed time between two samples fails the computation instead of
//! producing an infinite or NaN speed.

use crate::error::GazeError;
use crate::types::{GazeSample, VelocitySample};

/// Velocity computation over a sample window
pub struct KinematicsEngine;

impl KinematicsEngine {
    /// Compute `samples.len() - 1` speeds, one per inter-sample interval.
    ///
    /// Fewer than two samples yields an empty sequence.
    pub fn compute_velocities(samples: &[GazeSample]) -> Result<Vec<VelocitySample>, GazeError> {
        samples
            .windows(2)
            .enumerate()
            .map(|(i, pair)| step_velocity(&pair[0], &pair[1], i + 1))
            .collect()
    }

    /// Speed between two samples, `None` when the interval is not positive
    pub fn instantaneous(previous: &GazeSample, current: &GazeSample) -> Option<f64> {
        let elapsed = current.timestamp - previous.timestamp;
        if elapsed > 0.0 {
            Some(previous.distance_to(current) / elapsed)
        } else {
            None
        }
    }

    /// Mean magnitude of a velocity sequence
    pub fn mean_magnitude(velocities: &[VelocitySample]) -> Option<f64> {
        if velocities.is_empty() {
            return None;
        }
        let sum: f64 = velocities.iter().map(|v| v.magnitude).sum();
        Some(sum / velocities.len() as f64)
    }
}

fn step_velocity(
    previous: &GazeSample,
    current: &GazeSample,
    index: usize,
) -> Result<VelocitySample, GazeError> {
    let magnitude = KinematicsEngine::instantaneous(previous, current).ok_or(
        GazeError::DegenerateInterval {
            index,
            timestamp: current.timestamp,
        },
    )?;

    Ok(VelocitySample {
        timestamp: current.timestamp,
        magnitude,
    })
}
