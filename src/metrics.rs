//! Metric aggregation
//!
//! Reduces a sample window into fixation duration, saccade velocity and dwell
//! time. Each metric is computed independently; a failure in one is logged and
//! reported as 0.0 without affecting the other two.

use crate::error::GazeError;
use crate::types::{GazeSample, Metrics};
use tracing::{debug, warn};

/// Aggregator for gaze metrics
pub struct MetricsAggregator;

impl MetricsAggregator {
    /// Compute all metrics for a sample window
    pub fn aggregate(samples: &[GazeSample]) -> Metrics {
        Metrics {
            fixation_duration: or_zero("fixation_duration", compute_fixation_duration(samples)),
            saccade_velocity: or_zero("saccade_velocity", compute_saccade_velocity(samples)),
            dwell_time: or_zero("dwell_time", compute_dwell_time(samples)),
        }
    }
}

fn or_zero(metric: &'static str, result: Result<f64, GazeError>) -> f64 {
    match result {
        Ok(value) => value,
        Err(e @ GazeError::InsufficientSamples(_)) => {
            debug!(metric, error = %e, "Metric unavailable, using 0.0");
            0.0
        }
        Err(e) => {
            warn!(metric, kind = e.kind(), error = %e, "Metric unavailable, using 0.0");
            0.0
        }
    }
}

/// Consecutive inter-sample intervals; every interval must be positive
fn intervals(samples: &[GazeSample]) -> Result<Vec<f64>, GazeError> {
    if samples.len() < 2 {
        return Err(GazeError::InsufficientSamples(format!(
            "need at least 2 samples, got {}",
            samples.len()
        )));
    }

    samples
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let elapsed = pair[1].timestamp - pair[0].timestamp;
            if elapsed > 0.0 {
                Ok(elapsed)
            } else {
                Err(GazeError::DegenerateInterval {
                    index: i + 1,
                    timestamp: pair[1].timestamp,
                })
            }
        })
        .collect()
}

/// Mean of consecutive inter-sample intervals
pub fn compute_fixation_duration(samples: &[GazeSample]) -> Result<f64, GazeError> {
    let intervals = intervals(samples)?;
    Ok(intervals.iter().sum::<f64>() / intervals.len() as f64)
}

/// Mean of per-step displacement divided by elapsed time
pub fn compute_saccade_velocity(samples: &[GazeSample]) -> Result<f64, GazeError> {
    let intervals = intervals(samples)?;
    let total: f64 = samples
        .windows(2)
        .zip(&intervals)
        .map(|(pair, elapsed)| pair[0].distance_to(&pair[1]) / elapsed)
        .sum();
    Ok(total / intervals.len() as f64)
}

/// Sum of inter-sample intervals
pub fn compute_dwell_time(samples: &[GazeSample]) -> Result<f64, GazeError> {
    Ok(intervals(samples)?.iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn s(t: f64, x: f64, y: f64) -> GazeSample {
        GazeSample { timestamp: t, x, y }
    }

    #[test]
    fn test_aggregate() {
        let samples = [s(0.0, 1.0, 4.0), s(0.1, 2.0, 5.0), s(0.2, 3.0, 6.0)];
        let metrics = MetricsAggregator::aggregate(&samples);

        assert!((metrics.fixation_duration - 0.1).abs() < 1e-9);
        assert!((metrics.dwell_time - 0.2).abs() < 1e-9);
        // sqrt(2) / 0.1 per step
        let expected = 2f64.sqrt() / 0.1;
        assert!((metrics.saccade_velocity - expected).abs() < 1e-6);
    }

    #[test]
    fn test_insufficient_samples_default_to_zero() {
        assert_eq!(MetricsAggregator::aggregate(&[]), Metrics::default());
        assert_eq!(
            MetricsAggregator::aggregate(&[s(0.0, 1.0, 1.0)]),
            Metrics::default()
        );
        assert!(matches!(
            compute_dwell_time(&[s(0.0, 1.0, 1.0)]),
            Err(GazeError::InsufficientSamples(_))
        ));
    }

    #[test]
    fn test_backwards_timestamps_never_go_negative() {
        let samples = [s(1.0, 0.0, 0.0), s(0.5, 1.0, 0.0)];
        let metrics = MetricsAggregator::aggregate(&samples);

        assert_eq!(metrics, Metrics::default());
        assert_eq!(
            compute_dwell_time(&samples),
            Err(GazeError::DegenerateInterval {
                index: 1,
                timestamp: 0.5
            })
        );
        assert!(compute_fixation_duration(&samples).is_err());
    }

    #[test]
    fn test_repeated_timestamp_zeroes_interval_metrics() {
        let samples = [s(0.0, 0.0, 0.0), s(0.5, 1.0, 0.0), s(0.5, 2.0, 0.0)];
        let metrics = MetricsAggregator::aggregate(&samples);

        assert_eq!(metrics, Metrics::default());
        assert!(metrics.fixation_duration >= 0.0 && metrics.dwell_time >= 0.0);
    }

    #[test]
    fn test_saccade_velocity_degenerate_interval() {
        let samples = [s(0.0, 0.0, 0.0), s(0.0, 1.0, 0.0)];
        assert_eq!(
            compute_saccade_velocity(&samples),
            Err(GazeError::DegenerateInterval {
                index: 1,
                timestamp: 0.0
            })
        );
    }
}
