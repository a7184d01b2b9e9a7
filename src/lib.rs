//! Gazeflow - Real-time gaze-driven difficulty adaptation engine
//!
//! Gazeflow turns a stream of gaze samples into difficulty adjustments through a
//! periodic pipeline: buffering → kinematics → saccade/fixation classification
//! → metric aggregation → engagement scoring → difficulty control.
//!
//! ## Entry points
//!
//! - **Acquisition**: feed samples from any number of sensor threads
//! - **AdaptationLoop**: tokio task that runs one pipeline pass per tick and
//!   emits an adaptation message through a [`SignalSink`]
//! - **analyze_samples**: one-shot pass over a recorded window

pub mod acquisition;
pub mod adaptation;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod difficulty;
pub mod engagement;
pub mod error;
pub mod export;
pub mod kinematics;
pub mod metrics;
pub mod pipeline;
pub mod signal;
pub mod state;
pub mod types;

pub use acquisition::Acquisition;
pub use adaptation::{AdaptationLoop, LoopHandle, LoopSummary, StopHandle, TickReport};
pub use buffer::SampleBuffer;
pub use config::{ConfigError, EngineConfig};
pub use error::GazeError;
pub use export::{ExportError, SessionExport};
pub use pipeline::{analyze_samples, GazePipeline, PassReport, StageFault};
pub use signal::{AdaptationMessage, ChannelSink, JsonLinesSink, LogSink, SignalSink};
pub use state::{SharedUserState, UserState};
pub use types::{
    AdaptationSignal, DifficultyLevel, Event, EventKind, FlowState, GazeSample, Metrics,
    RawGazeSample,
};

/// Engine version reported by the CLI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for exported sessions and adaptation streams
pub const PRODUCER_NAME: &str = "gazeflow";
