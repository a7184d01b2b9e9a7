//! Sample acquisition
//!
//! Entry point for the sensor side. Each accepted sample is appended to the
//! shared buffer and its instantaneous speed (relative to the previous
//! buffered sample) is written straight into the user state, so the
//! velocity-threshold rule reacts without waiting for the next tick.

use crate::buffer::{PushOutcome, SampleBuffer};
use crate::error::GazeError;
use crate::kinematics::KinematicsEngine;
use crate::signal::SignalSelector;
use crate::state::SharedUserState;
use crate::types::{GazeSample, RawGazeSample};
use std::sync::Arc;
use tracing::warn;

/// Cloneable writer handle; any number of acquisition threads may share one
#[derive(Debug, Clone)]
pub struct Acquisition {
    buffer: Arc<SampleBuffer>,
    state: SharedUserState,
    selector: SignalSelector,
}

impl Acquisition {
    pub fn new(buffer: Arc<SampleBuffer>, state: SharedUserState, selector: SignalSelector) -> Self {
        Self {
            buffer,
            state,
            selector,
        }
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn state(&self) -> &SharedUserState {
        &self.state
    }

    /// Validate and buffer one sample
    pub fn ingest(&self, sample: GazeSample) -> Result<PushOutcome, GazeError> {
        if let Err(e) = sample.validate() {
            warn!(error = %e, "Rejected gaze sample");
            return Err(e);
        }

        let previous = self.buffer.latest();
        let outcome = self.buffer.push(sample);

        if let Some(speed) = previous.and_then(|p| KinematicsEngine::instantaneous(&p, &sample)) {
            self.state.record_velocity(speed, &self.selector);
        }

        Ok(outcome)
    }

    /// Ingest a sample whose fields may be missing
    pub fn ingest_raw(&self, raw: RawGazeSample) -> Result<PushOutcome, GazeError> {
        let sample = GazeSample::try_from(raw).map_err(|e| {
            warn!(error = %e, "Rejected gaze sample");
            e
        })?;
        self.ingest(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AdaptationSignal;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn acquisition(capacity: usize) -> Acquisition {
        Acquisition::new(
            Arc::new(SampleBuffer::new(capacity)),
            SharedUserState::new(),
            SignalSelector::new(50.0, 0.5),
        )
    }

    #[test]
    fn test_ingest_updates_velocity() {
        let acq = acquisition(10);
        acq.ingest(GazeSample::new(0.0, 0.0, 0.0).unwrap()).unwrap();
        assert_eq!(acq.state().snapshot().velocity, 0.0);

        acq.ingest(GazeSample::new(0.1, 3.0, 4.0).unwrap()).unwrap();
        assert!((acq.state().snapshot().velocity - 50.0).abs() < 1e-9);
        assert_eq!(acq.buffer().len(), 2);
    }

    #[test]
    fn test_ingest_rejects_invalid_without_buffering() {
        let acq = acquisition(10);
        let bad = GazeSample {
            timestamp: 0.0,
            x: f64::NAN,
            y: 0.0,
        };
        assert_eq!(acq.ingest(bad).unwrap_err().kind(), "invalid_sample");

        let raw = RawGazeSample {
            timestamp: Some(0.0),
            x: Some(1.0),
            y: None,
        };
        assert!(acq.ingest_raw(raw).is_err());
        assert!(acq.buffer().is_empty());
    }

    #[test]
    fn test_fast_sample_fires_velocity_signal() {
        let acq = acquisition(10);
        acq.ingest(GazeSample::new(0.0, 0.0, 0.0).unwrap()).unwrap();
        acq.ingest(GazeSample::new(0.01, 10.0, 0.0).unwrap()).unwrap();
        assert_eq!(
            acq.state().active_signal(),
            AdaptationSignal::VelocityThreshold
        );
    }

    #[test]
    fn test_repeated_timestamp_buffered_without_velocity() {
        let acq = acquisition(10);
        acq.ingest(GazeSample::new(1.0, 0.0, 0.0).unwrap()).unwrap();
        let outcome = acq.ingest(GazeSample::new(1.0, 5.0, 0.0).unwrap()).unwrap();

        assert!(outcome.out_of_order);
        assert_eq!(acq.buffer().len(), 2);
        assert_eq!(acq.state().snapshot().velocity, 0.0);
    }

    #[test]
    fn test_concurrent_writers() {
        let acq = acquisition(1000);
        let handles: Vec<_> = (0..4)
            .map(|w| {
                let acq = acq.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        let t = (w * 1000 + i) as f64;
                        acq.ingest(GazeSample::new(t, i as f64, 0.0).unwrap()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(acq.buffer().len(), 400);
    }
}
