//! Record sinks: the narrow interface to the persistence collaborator.
//!
//! The engine hands every aggregate record to exactly one sink. A sink failure
//! is reported back as a warning; it never rolls back engine state.

use crate::core::record::AggregateRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Errors a sink can report.
#[derive(Debug)]
pub enum SinkError {
    Io(String),
    Serialize(String),
    Unavailable(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "IO error: {e}"),
            SinkError::Serialize(e) => write!(f, "Serialize error: {e}"),
            SinkError::Unavailable(e) => write!(f, "Sink unavailable: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Receives aggregate records after each processed update.
///
/// Sinks live inside the shared engine, so they must be `Send + Sync`.
pub trait RecordSink: Send + Sync {
    fn accept(&mut self, record: &AggregateRecord) -> Result<(), SinkError>;
}

/// Keeps records in memory behind a shared handle.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AggregateRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record accepted so far.
    pub fn records(&self) -> Vec<AggregateRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn accept(&mut self, record: &AggregateRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Appends one JSON record per line to a file.
pub struct JsonlFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl JsonlFileSink {
    /// Open (or create) the file for appending, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SinkError::Io(e.to_string()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written by this sink.
    pub fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for JsonlFileSink {
    fn accept(&mut self, record: &AggregateRecord) -> Result<(), SinkError> {
        let line =
            serde_json::to_string(record).map_err(|e| SinkError::Serialize(e.to_string()))?;
        writeln!(self.writer, "{line}").map_err(|e| SinkError::Io(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| SinkError::Io(e.to_string()))?;
        self.written += 1;
        Ok(())
    }
}

/// Adapts a closure into a sink.
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: FnMut(&AggregateRecord) -> Result<(), SinkError> + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> RecordSink for CallbackSink<F>
where
    F: FnMut(&AggregateRecord) -> Result<(), SinkError> + Send + Sync,
{
    fn accept(&mut self, record: &AggregateRecord) -> Result<(), SinkError> {
        (self.callback)(record)
    }
}

/// Read back a JSON Lines record file.
pub fn read_jsonl_records(path: impl AsRef<Path>) -> Result<Vec<AggregateRecord>, SinkError> {
    let content = std::fs::read_to_string(path).map_err(|e| SinkError::Io(e.to_string()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| SinkError::Serialize(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matrix::PairwiseMatrices;
    use crate::core::record::{RecordBuilder, RecordContents};
    use crate::transport::SensorId;
    use chrono::Utc;

    fn sample_record(builder: &mut RecordBuilder) -> AggregateRecord {
        let trigger = SensorId::new("Blue");
        let matrices = PairwiseMatrices::compute(&[70.0, 71.0]);
        builder.build(RecordContents {
            timestamp: Utc::now(),
            trigger_sensor: &trigger,
            sensors: Vec::new(),
            distance_matrix: &matrices.distance,
            proximity_matrix: &matrices.proximity,
            proximity_score: matrices.proximity_score(),
            soft_clusters: &[],
            hard_clusters: &[],
        })
    }

    #[test]
    fn test_memory_sink_shares_records() {
        let sink = MemorySink::new();
        let mut handle: Box<dyn RecordSink> = Box::new(sink.clone());
        let mut builder = RecordBuilder::new();

        handle.accept(&sample_record(&mut builder)).unwrap();
        handle.accept(&sample_record(&mut builder)).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.records()[1].sequence, 2);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.jsonl");
        let mut builder = RecordBuilder::new();

        let mut sink = JsonlFileSink::create(&path).unwrap();
        sink.accept(&sample_record(&mut builder)).unwrap();
        sink.accept(&sample_record(&mut builder)).unwrap();
        assert_eq!(sink.written(), 2);

        let records = read_jsonl_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].trigger_sensor.as_str(), "Blue");
    }

    #[test]
    fn test_callback_sink_propagates_errors() {
        let mut sink =
            CallbackSink::new(|_: &AggregateRecord| Err(SinkError::Unavailable("offline".into())));
        let mut builder = RecordBuilder::new();

        let err = sink.accept(&sample_record(&mut builder)).unwrap_err();
        assert_eq!(err.to_string(), "Sink unavailable: offline");
    }
}
