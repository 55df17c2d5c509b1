//! Session transparency log.
//!
//! Counts what the engine ingested, rejected and handed off, so an operator
//! can audit a session without reading the records themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Processing statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Updates that completed
    updates_processed: AtomicU64,
    /// Updates rejected as a whole (unknown sensor, dimension mismatch)
    updates_rejected: AtomicU64,
    /// IBI values appended to a series
    ibis_accepted: AtomicU64,
    /// IBI values skipped as invalid
    ibis_rejected: AtomicU64,
    /// Records accepted by the sink
    records_emitted: AtomicU64,
    /// Records the sink failed to accept
    handoff_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            updates_processed: AtomicU64::new(0),
            updates_rejected: AtomicU64::new(0),
            ibis_accepted: AtomicU64::new(0),
            ibis_rejected: AtomicU64::new(0),
            records_emitted: AtomicU64::new(0),
            handoff_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Try to load existing stats
        if let Err(e) = log.load() {
            warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_update_processed(&self) {
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_rejected(&self) {
        self.updates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ibis(&self, accepted: u64, rejected: u64) {
        self.ibis_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.ibis_rejected.fetch_add(rejected, Ordering::Relaxed);
    }

    pub fn record_record_emitted(&self) {
        self.records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handoff_failure(&self) {
        self.handoff_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            updates_processed: self.updates_processed.load(Ordering::Relaxed),
            updates_rejected: self.updates_rejected.load(Ordering::Relaxed),
            ibis_accepted: self.ibis_accepted.load(Ordering::Relaxed),
            ibis_rejected: self.ibis_rejected.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            handoff_failures: self.handoff_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Updates processed: {}\n\
             - Updates rejected: {}\n\
             - IBIs accepted: {}\n\
             - IBIs rejected: {}\n\
             - Records emitted: {}\n\
             - Record handoff failures: {}\n\
             - Session duration: {} seconds",
            stats.updates_processed,
            stats.updates_rejected,
            stats.ibis_accepted,
            stats.ibis_rejected,
            stats.records_emitted,
            stats.handoff_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                updates_processed: stats.updates_processed,
                updates_rejected: stats.updates_rejected,
                ibis_accepted: stats.ibis_accepted,
                ibis_rejected: stats.ibis_rejected,
                records_emitted: stats.records_emitted,
                handoff_failures: stats.handoff_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.updates_processed
                    .store(persisted.updates_processed, Ordering::Relaxed);
                self.updates_rejected
                    .store(persisted.updates_rejected, Ordering::Relaxed);
                self.ibis_accepted
                    .store(persisted.ibis_accepted, Ordering::Relaxed);
                self.ibis_rejected
                    .store(persisted.ibis_rejected, Ordering::Relaxed);
                self.records_emitted
                    .store(persisted.records_emitted, Ordering::Relaxed);
                self.handoff_failures
                    .store(persisted.handoff_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub updates_processed: u64,
    pub updates_rejected: u64,
    pub ibis_accepted: u64,
    pub ibis_rejected: u64,
    pub records_emitted: u64,
    pub handoff_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    updates_processed: u64,
    updates_rejected: u64,
    ibis_accepted: u64,
    ibis_rejected: u64,
    records_emitted: u64,
    handoff_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
