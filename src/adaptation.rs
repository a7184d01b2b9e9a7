//! Adaptation loop
//!
//! A periodic task that snapshots the sample buffer, runs one pipeline pass,
//! folds the result into the shared user state and emits exactly one
//! adaptation message per tick. Ticks never overlap: a pass that overruns the
//! interval delays the next tick instead of stacking another one behind it.
//!
//! Cancellation is cooperative. [`StopHandle::stop`] sets a flag that the loop
//! checks before each tick and that also interrupts the wait between ticks.

use crate::acquisition::Acquisition;
use crate::buffer::SampleBuffer;
use crate::config::EngineConfig;
use crate::pipeline::{GazePipeline, PassReport, Stage, StageFault};
use crate::signal::{AdaptationMessage, SignalSelector, SignalSink};
use crate::state::{SharedUserState, UserState};
use crate::types::AdaptationSignal;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Requests a running loop to stop after its current tick
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Outcome of a single tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub signal: AdaptationSignal,
    pub emitted: bool,
    pub pass: PassReport,
}

/// Totals reported when the loop exits
#[derive(Debug, Clone, Serialize)]
pub struct LoopSummary {
    pub session_id: Uuid,
    pub ticks: u64,
    /// Ticks where at least one stage recorded a fault
    pub degraded_ticks: u64,
    pub emission_failures: u64,
    pub final_state: UserState,
}

/// Handle to a loop running on the tokio runtime
#[derive(Debug)]
pub struct LoopHandle {
    stop: StopHandle,
    join: JoinHandle<LoopSummary>,
}

impl LoopHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop the loop and wait for its summary
    pub async fn shutdown(self) -> Result<LoopSummary, JoinError> {
        self.stop.stop();
        self.join.await
    }
}

/// Periodic pipeline driver
pub struct AdaptationLoop {
    session_id: Uuid,
    buffer: Arc<SampleBuffer>,
    state: SharedUserState,
    pipeline: GazePipeline,
    selector: SignalSelector,
    sink: Box<dyn SignalSink + Send>,
    interval: Duration,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    ticks: u64,
    degraded_ticks: u64,
    emission_failures: u64,
}

impl AdaptationLoop {
    pub fn new(
        config: &EngineConfig,
        buffer: Arc<SampleBuffer>,
        state: SharedUserState,
        sink: Box<dyn SignalSink + Send>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            session_id: Uuid::new_v4(),
            buffer,
            state,
            pipeline: GazePipeline::new(config),
            selector: SignalSelector::from_config(config),
            sink,
            interval: config.tick_interval(),
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            ticks: 0,
            degraded_ticks: 0,
            emission_failures: 0,
        }
    }

    /// Build a loop together with an acquisition handle over fresh shared state
    pub fn with_acquisition(
        config: &EngineConfig,
        sink: Box<dyn SignalSink + Send>,
    ) -> (Self, Acquisition) {
        let buffer = Arc::new(SampleBuffer::new(config.buffer_capacity));
        let state = SharedUserState::new();
        let acquisition = Acquisition::new(
            Arc::clone(&buffer),
            state.clone(),
            SignalSelector::from_config(config),
        );
        (Self::new(config, buffer, state, sink), acquisition)
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: Arc::clone(&self.stop_tx),
        }
    }

    /// Run exactly one pass and emit its signal
    pub fn tick(&mut self) -> TickReport {
        let samples = self.buffer.snapshot();
        let mut pass = self.pipeline.process(&samples);
        let (tick, signal) = self.state.record_pass(&pass, &self.selector);

        let message = AdaptationMessage {
            session_id: self.session_id,
            tick,
            signal,
            flow_state: pass.flow_state,
            difficulty: pass.difficulty,
            engagement: pass.engagement,
            emitted_at: Utc::now(),
        };

        let emitted = match self.sink.emit(&message) {
            Ok(()) => true,
            Err(e) => {
                warn!(tick, error = %e, "Failed to emit adaptation signal");
                pass.faults
                    .push(StageFault::new(Stage::Emission, "sink_error", e.to_string()));
                self.emission_failures += 1;
                false
            }
        };

        self.ticks += 1;
        if pass.is_degraded() {
            self.degraded_ticks += 1;
            debug!(tick, faults = pass.faults.len(), "Degraded tick");
        }

        TickReport {
            tick,
            signal,
            emitted,
            pass,
        }
    }

    fn summary(&self) -> LoopSummary {
        LoopSummary {
            session_id: self.session_id,
            ticks: self.ticks,
            degraded_ticks: self.degraded_ticks,
            emission_failures: self.emission_failures,
            final_state: self.state.snapshot(),
        }
    }

    /// Tick on the configured interval until stopped
    pub async fn run(mut self) -> LoopSummary {
        let mut stop_rx = self.stop_rx.clone();
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            session_id = %self.session_id,
            interval = ?self.interval,
            "Adaptation loop started"
        );

        loop {
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    let stopped = changed.is_err() || *stop_rx.borrow();
                    if stopped {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            let stopped = *stop_rx.borrow();
            if stopped {
                break;
            }
            self.tick();
        }

        let summary = self.summary();
        info!(
            session_id = %summary.session_id,
            ticks = summary.ticks,
            degraded_ticks = summary.degraded_ticks,
            emission_failures = summary.emission_failures,
            "Adaptation loop stopped"
        );
        summary
    }

    /// Spawn the loop onto the current tokio runtime
    pub fn spawn(self) -> LoopHandle {
        let stop = self.stop_handle();
        let join = tokio::spawn(self.run());
        LoopHandle { stop, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{ChannelSink, SinkError};
    use crate::types::{DifficultyLevel, FlowState, GazeSample};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink(Arc<AtomicUsize>);

    impl SignalSink for FailingSink {
        fn emit(&mut self, _message: &AdaptationMessage) -> Result<(), SinkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Closed)
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            tick_interval_ms: 5,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_tick_on_empty_buffer_emits_defaults() {
        let (sink, mut receiver) = ChannelSink::new(8);
        let (mut adaptation, _acq) = AdaptationLoop::with_acquisition(&fast_config(), Box::new(sink));

        let report = adaptation.tick();
        assert_eq!(report.tick, 1);
        assert!(report.emitted);
        assert_eq!(report.signal, AdaptationSignal::VelocityThreshold);
        assert!(report.pass.is_degraded());

        let message = receiver.try_recv().unwrap();
        assert_eq!(message.session_id, adaptation.session_id());
        assert_eq!(message.flow_state, FlowState::Flow);
        assert_eq!(message.difficulty, DifficultyLevel::Medium);
        assert_eq!(message.engagement, None);
    }

    #[test]
    fn test_tick_scores_buffered_samples() {
        let (sink, mut receiver) = ChannelSink::new(8);
        let (mut adaptation, acq) = AdaptationLoop::with_acquisition(&fast_config(), Box::new(sink));
        for i in 0..10 {
            acq.ingest(GazeSample::new(i as f64 * 0.01, i as f64 * 2.0, 0.0).unwrap())
                .unwrap();
        }

        let report = adaptation.tick();
        assert!(!report.pass.is_degraded());
        // 200 px/s → engagement far above the flow threshold
        assert_eq!(report.signal, AdaptationSignal::FlowTheory);
        assert_eq!(report.pass.flow_state, FlowState::Anxiety);

        let message = receiver.try_recv().unwrap();
        assert_eq!(message.difficulty, DifficultyLevel::Easy);
        assert_eq!(acq.state().snapshot().difficulty, DifficultyLevel::Easy);
    }

    #[test]
    fn test_sink_failure_does_not_stop_ticks() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (mut adaptation, _acq) = AdaptationLoop::with_acquisition(
            &fast_config(),
            Box::new(FailingSink(Arc::clone(&attempts))),
        );

        let first = adaptation.tick();
        let second = adaptation.tick();
        assert!(!first.emitted);
        assert_eq!(second.tick, 2);
        assert_eq!(second.pass.faults_in(Stage::Emission).count(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(adaptation.summary().emission_failures, 2);
    }

    #[tokio::test]
    async fn test_spawned_loop_ticks_until_stopped() {
        let (sink, mut receiver) = ChannelSink::new(64);
        let (adaptation, acq) = AdaptationLoop::with_acquisition(&fast_config(), Box::new(sink));
        for i in 0..5 {
            acq.ingest(GazeSample::new(i as f64 * 0.1, 10.0, 10.0).unwrap())
                .unwrap();
        }

        let handle = adaptation.spawn();
        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.tick, 1);
        assert_eq!(second.tick, 2);

        let summary = handle.shutdown().await.unwrap();
        assert!(summary.ticks >= 2);
        assert_eq!(summary.final_state.ticks, summary.ticks);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_ingest_while_ticking() {
        let config = EngineConfig {
            buffer_capacity: 16,
            ..fast_config()
        };
        let (sink, mut receiver) = ChannelSink::new(4096);
        let (adaptation, acq) = AdaptationLoop::with_acquisition(&config, Box::new(sink));
        let handle = adaptation.spawn();

        let writer = acq.clone();
        let ingested = tokio::task::spawn_blocking(move || {
            for i in 0..100 {
                let sample = GazeSample::new(i as f64 * 0.01, (i % 7) as f64 * 3.0, 0.0).unwrap();
                writer.ingest(sample).unwrap();
                assert!(writer.buffer().len() <= 16);
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        ingested.await.unwrap();

        let summary = handle.shutdown().await.unwrap();
        assert!(summary.ticks >= 1);
        assert_eq!(summary.final_state.ticks, summary.ticks);
        assert_eq!(acq.buffer().len(), 16);

        let mut ticks = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            ticks.push(message.tick);
        }
        let expected: Vec<u64> = (1..=summary.ticks).collect();
        assert_eq!(ticks, expected);
    }

    #[tokio::test]
    async fn test_stop_before_run_exits_without_ticking() {
        let (adaptation, _acq) = AdaptationLoop::with_acquisition(
            &fast_config(),
            Box::new(crate::signal::LogSink),
        );
        let stop = adaptation.stop_handle();
        stop.stop();
        assert!(stop.is_stopped());

        let summary = adaptation.run().await;
        assert_eq!(summary.ticks, 0);
    }
}
