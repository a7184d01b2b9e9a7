//! Session export
//!
//! Serializes buffered samples and the last computed metrics for offline
//! analysis: a JSON document with `eye_data` and `physiological_data` arrays,
//! or a flat `timestamp,x,y,velocity` CSV table.

use crate::kinematics::KinematicsEngine;
use crate::types::{GazeSample, Metrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const CSV_HEADER: [&str; 4] = ["timestamp", "x", "y", "velocity"];

/// Errors raised while exporting a session
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),
}

/// One exported gaze row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportedSample {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    /// Speed from the previous sample; empty for the first row or a
    /// non-advancing timestamp
    pub velocity: Option<f64>,
}

/// Snapshot of a session ready to be written out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub eye_data: Vec<ExportedSample>,
    /// Always empty; kept so consumers see the full document shape
    pub physiological_data: Vec<serde_json::Value>,
    pub metrics: Metrics,
}

impl SessionExport {
    pub fn from_samples(samples: &[GazeSample], metrics: Metrics) -> Self {
        let mut eye_data = Vec::with_capacity(samples.len());
        let mut previous: Option<&GazeSample> = None;
        for sample in samples {
            eye_data.push(ExportedSample {
                timestamp: sample.timestamp,
                x: sample.x,
                y: sample.y,
                velocity: previous.and_then(|p| KinematicsEngine::instantaneous(p, sample)),
            });
            previous = Some(sample);
        }

        Self {
            session_id: Uuid::new_v4(),
            exported_at: Utc::now(),
            eye_data,
            physiological_data: Vec::new(),
            metrics,
        }
    }

    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the eye-data table as CSV; the header is written even when empty
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(CSV_HEADER)?;
        for row in &self.eye_data {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), rows = self.eye_data.len(), "Exported session JSON");
        Ok(())
    }

    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        self.write_csv(BufWriter::new(File::create(path)?))?;
        info!(path = %path.display(), rows = self.eye_data.len(), "Exported session CSV");
        Ok(())
    }
}
