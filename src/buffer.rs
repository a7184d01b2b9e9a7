//! Bounded gaze sample buffer
//!
//! The buffer keeps the most recent samples in arrival order. Once capacity is
//! exceeded the oldest sample is dropped; writers never block on a full buffer.

use crate::config::DEFAULT_BUFFER_CAPACITY;
use crate::types::GazeSample;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// What happened to the buffer on a push
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PushOutcome {
    /// Oldest sample dropped to make room, if any
    pub evicted: Option<GazeSample>,
    /// The sample's timestamp did not advance past the previous sample
    pub out_of_order: bool,
}

/// Thread-safe FIFO ring of recent gaze samples
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Mutex<VecDeque<GazeSample>>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest entry when over capacity.
    ///
    /// Samples whose timestamp does not advance are still buffered but flagged
    /// in the returned outcome.
    pub fn push(&self, sample: GazeSample) -> PushOutcome {
        let mut samples = self.samples.lock();

        let out_of_order = samples
            .back()
            .is_some_and(|last| sample.timestamp <= last.timestamp);

        samples.push_back(sample);
        let evicted = if samples.len() > self.capacity {
            samples.pop_front()
        } else {
            None
        };
        drop(samples);

        if out_of_order {
            warn!(
                timestamp = sample.timestamp,
                "Gaze sample timestamp did not advance"
            );
        }
        if let Some(old) = evicted {
            debug!(evicted_timestamp = old.timestamp, "Sample buffer full, dropped oldest");
        }

        PushOutcome {
            evicted,
            out_of_order,
        }
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<GazeSample> {
        self.samples.lock().iter().copied().collect()
    }

    /// Most recently pushed sample
    pub fn latest(&self) -> Option<GazeSample> {
        self.samples.lock().back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every buffered sample
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}
