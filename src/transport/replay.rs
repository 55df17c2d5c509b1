//! Replay of recorded sensor updates from a JSON Lines file.
//!
//! Stands in for the live wireless transport: a background thread reads one
//! `SensorUpdate` per line and pushes it into the update channel.

use crate::transport::types::SensorUpdate;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Default capacity of the update queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// How long a blocked send waits before re-checking the running flag.
const SEND_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a replay run.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// File containing one JSON-encoded update per line
    pub input: PathBuf,
    /// Delay between consecutive updates (zero replays as fast as possible)
    pub pace: Duration,
    /// Capacity of the update queue
    pub queue_capacity: usize,
}

impl ReplayConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            pace: Duration::ZERO,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Errors that can occur while replaying updates.
#[derive(Debug)]
pub enum TransportError {
    Io(String),
    Parse { line: usize, message: String },
    AlreadyRunning,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {e}"),
            TransportError::Parse { line, message } => {
                write!(f, "Parse error on line {line}: {message}")
            }
            TransportError::AlreadyRunning => write!(f, "Replay is already running"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Create the bounded queue that serializes updates into the single writer.
pub fn update_channel(capacity: usize) -> (Sender<SensorUpdate>, Receiver<SensorUpdate>) {
    bounded(capacity)
}

/// Parse one replay line. Blank lines yield `None`.
pub fn parse_update_line(line_no: usize, line: &str) -> Result<Option<SensorUpdate>, TransportError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| TransportError::Parse {
            line: line_no,
            message: e.to_string(),
        })
}

/// Replays a recorded update file on a background thread.
pub struct ReplaySource {
    config: ReplayConfig,
    sender: Sender<SensorUpdate>,
    receiver: Receiver<SensorUpdate>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<usize>>,
}

impl ReplaySource {
    /// Create a new replay source.
    pub fn new(config: ReplayConfig) -> Self {
        let (sender, receiver) = update_channel(config.queue_capacity);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start replaying.
    ///
    /// The input file is opened eagerly so a missing file is reported here
    /// rather than on the background thread.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(TransportError::AlreadyRunning);
        }

        let file = File::open(&self.config.input)
            .map_err(|e| TransportError::Io(format!("{:?}: {e}", self.config.input)))?;

        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let sender = self.sender.clone();
        let pace = self.config.pace;

        self.handle = Some(thread::spawn(move || {
            let mut sent = 0;
            for (idx, line) in BufReader::new(file).lines().enumerate() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Replay read failed: {e}");
                        break;
                    }
                };
                match parse_update_line(idx + 1, &line) {
                    Ok(Some(update)) => {
                        if !send_while_running(&sender, &running, update) {
                            break;
                        }
                        sent += 1;
                        if !pace.is_zero() {
                            thread::sleep(pace);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping malformed update: {e}"),
                }
            }
            debug!(sent, "Replay finished");
            running.store(false, Ordering::SeqCst);
            sent
        }));

        Ok(())
    }

    /// Stop replaying and wait for the reader thread.
    ///
    /// Returns the number of updates that were queued.
    pub fn stop(&mut self) -> usize {
        self.running.store(false, Ordering::SeqCst);
        self.wait()
    }

    /// Wait for the reader thread to reach the end of the file.
    ///
    /// Blocks while the queue is full, so the caller must drain it or use
    /// [`ReplaySource::stop`].
    pub fn wait(&mut self) -> usize {
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }

    /// Check if the replay thread is still producing updates.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for sensor updates.
    pub fn receiver(&self) -> &Receiver<SensorUpdate> {
        &self.receiver
    }

    /// Try to receive an update without blocking.
    pub fn try_recv(&self) -> Option<SensorUpdate> {
        self.receiver.try_recv().ok()
    }
}

/// Queue one update, giving up once the source is stopped or the queue is
/// disconnected. Returns whether the update was queued.
fn send_while_running(
    sender: &Sender<SensorUpdate>,
    running: &AtomicBool,
    update: SensorUpdate,
) -> bool {
    let mut pending = update;
    loop {
        match sender.send_timeout(pending, SEND_POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(update)) => {
                if !running.load(Ordering::SeqCst) {
                    debug!("Replay stopped with a full queue");
                    return false;
                }
                pending = update;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_update_line() {
        let update = parse_update_line(1, r#"{"sensor_id":"Red","heart_rate":64,"ibis":[0.9]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(update.sensor_id.as_str(), "Red");
        assert_eq!(update.ibis, vec![0.9]);

        assert!(parse_update_line(2, "   ").unwrap().is_none());
        assert!(matches!(
            parse_update_line(3, "{not json"),
            Err(TransportError::Parse { line: 3, .. })
        ));
    }

    #[test]
    fn test_replay_delivers_updates_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"sensor_id":"Blue","heart_rate":70,"ibis":[0.85]}}"#).unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"sensor_id":"Red","heart_rate":80,"ibis":[]}}"#).unwrap();

        let mut source = ReplaySource::new(ReplayConfig::new(file.path()));
        source.start().unwrap();
        let sent = source.wait();
        assert_eq!(sent, 2);

        let first = source.try_recv().unwrap();
        let second = source.try_recv().unwrap();
        assert_eq!(first.sensor_id.as_str(), "Blue");
        assert_eq!(second.sensor_id.as_str(), "Red");
        assert!(source.try_recv().is_none());
    }

    #[test]
    fn test_stop_with_full_queue_returns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..20 {
            writeln!(file, r#"{{"sensor_id":"Blue","heart_rate":{},"ibis":[]}}"#, 60 + i).unwrap();
        }

        let mut source = ReplaySource::new(ReplayConfig::new(file.path()).with_queue_capacity(4));
        source.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        assert!(source.is_running());

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let stopper = thread::spawn(move || {
            let sent = source.stop();
            let _ = done_tx.send(sent);
            source
        });

        let sent = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("stop() should return while the queue is full");
        assert_eq!(sent, 4);

        let source = stopper.join().unwrap();
        assert!(!source.is_running());
        assert_eq!(source.receiver().len(), 4);
    }

    #[test]
    fn test_replay_missing_file() {
        let mut source = ReplaySource::new(ReplayConfig::new("/definitely/not/here.jsonl"));
        assert!(matches!(source.start(), Err(TransportError::Io(_))));
        assert!(!source.is_running());
    }
}
