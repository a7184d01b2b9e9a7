//! Adaptation signals
//!
//! This module decides which classifier's signal is active and delivers one
//! adaptation message per tick to the host environment through a
//! [`SignalSink`]. Delivery is fire-and-forget: sinks must not block and their
//! failures are logged by the caller, never retried.

use crate::config::EngineConfig;
use crate::types::{AdaptationSignal, DifficultyLevel, FlowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Signal in effect before any classifier has fired
pub const INITIAL_SIGNAL: AdaptationSignal = AdaptationSignal::VelocityThreshold;

/// Errors raised by signal sinks
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Signal receiver has been dropped")]
    Closed,

    #[error("Signal channel is full")]
    Full,

    #[error("Failed to write signal: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode signal: {0}")]
    Json(#[from] serde_json::Error),
}

/// One adaptation message for the host environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationMessage {
    pub session_id: Uuid,
    pub tick: u64,
    pub signal: AdaptationSignal,
    pub flow_state: FlowState,
    pub difficulty: DifficultyLevel,
    pub engagement: Option<f64>,
    pub emitted_at: DateTime<Utc>,
}

/// Chooses the active signal from the two threshold classifiers.
///
/// The velocity rule is applied first and the flow rule second, so when both
/// fire in the same update the flow-theory signal wins. When neither fires the
/// previous signal stays active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSelector {
    velocity_threshold: f64,
    flow_threshold: f64,
}

impl SignalSelector {
    pub fn new(velocity_threshold: f64, flow_threshold: f64) -> Self {
        Self {
            velocity_threshold,
            flow_threshold,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.velocity_threshold, config.flow_threshold)
    }

    pub fn select(
        &self,
        current: AdaptationSignal,
        velocity: Option<f64>,
        engagement: Option<f64>,
    ) -> AdaptationSignal {
        let mut signal = current;
        if velocity.is_some_and(|v| v > self.velocity_threshold) {
            signal = AdaptationSignal::VelocityThreshold;
        }
        if engagement.is_some_and(|e| e > self.flow_threshold) {
            signal = AdaptationSignal::FlowTheory;
        }
        signal
    }
}

/// Destination for adaptation messages
pub trait SignalSink {
    /// Attempt delivery of one message without blocking
    fn emit(&mut self, message: &AdaptationMessage) -> Result<(), SinkError>;
}

/// Sink that only records messages in the log
#[derive(Debug, Default)]
pub struct LogSink;

impl SignalSink for LogSink {
    fn emit(&mut self, message: &AdaptationMessage) -> Result<(), SinkError> {
        info!(
            tick = message.tick,
            signal = message.signal.as_str(),
            flow_state = message.flow_state.as_str(),
            difficulty = message.difficulty.as_str(),
            "Adaptation signal"
        );
        Ok(())
    }
}

/// Sink backed by a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<AdaptationMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver the host reads from
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AdaptationMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl SignalSink for ChannelSink {
    fn emit(&mut self, message: &AdaptationMessage) -> Result<(), SinkError> {
        self.sender.try_send(message.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Sink writing one JSON object per line
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    flush: bool,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W, flush: bool) -> Self {
        Self { writer, flush }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> SignalSink for JsonLinesSink<W> {
    fn emit(&mut self, message: &AdaptationMessage) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, message)?;
        self.writer.write_all(b"\n")?;
        if self.flush {
            self.writer.flush()?;
        }
        Ok(())
    }
}
