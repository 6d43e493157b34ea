//! Crash-safe persistence of the job tables.
//!
//! The queue rows are the only durable state this engine owns: a crash
//! mid-job must leave either no partial store mutation (the checkpoint is
//! simply gone) or a job row that re-drives the side effect on restart.
//!
//! # Atomic Writes
//!
//! Snapshots are written with a write-to-temp-then-rename pattern:
//! 1. Write to `queues.json.tmp`
//! 2. fsync the file
//! 3. Rename to `queues.json`
//! 4. fsync the directory
//!
//! Readers therefore always see either the old or the new snapshot, never a
//! partial write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cascade::UpdateRequest;
use crate::port::PortRequest;
use crate::queue::job::JobTable;
use crate::retire::RetireRequest;

use super::Store;

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Persisted queue state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this snapshot was written.
    pub snapshot_at: DateTime<Utc>,

    pub port_jobs: JobTable<PortRequest>,
    pub update_jobs: JobTable<UpdateRequest>,
    pub retire_jobs: JobTable<RetireRequest>,

    /// Preserved so restarts never reuse a job id.
    pub next_job_id: u64,
}

impl QueueSnapshot {
    /// Captures the durable portion of the store.
    pub fn capture(store: &Store) -> Self {
        QueueSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            port_jobs: store.port_jobs.clone(),
            update_jobs: store.update_jobs.clone(),
            retire_jobs: store.retire_jobs.clone(),
            next_job_id: store.next_job_id,
        }
    }

    /// Restores the captured queues into a store (typically a fresh one at
    /// startup).
    pub fn restore_into(self, store: &mut Store) {
        store.port_jobs = self.port_jobs;
        store.update_jobs = self.update_jobs;
        store.retire_jobs = self.retire_jobs;
        store.next_job_id = store.next_job_id.max(self.next_job_id);
    }
}

/// Writes a snapshot atomically to `path`.
pub fn save(path: &Path, snapshot: &QueueSnapshot) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(snapshot)?;
    let mut file = File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }
    Ok(())
}

/// Loads the snapshot at `path`, or `None` if no snapshot exists yet.
pub fn load(path: &Path) -> Result<Option<QueueSnapshot>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot: QueueSnapshot = serde_json::from_slice(&bytes)?;
    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }
    Ok(Some(snapshot))
}

/// Syncs a directory so the rename itself survives a power loss.
fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir)?;
    dir.sync_all()
}
