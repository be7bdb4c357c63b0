//! Snapshot and checkpoint persistence
//!
//! Both files are written by whole-file replacement: the document goes to a
//! temporary file in the target directory which is then renamed over the
//! target, so a reader sees either the previous or the new content.
//!
//! Reads never fail a run. A missing or unparsable file degrades to the
//! default value with a warning, so a corrupted cache cannot block a fresh
//! fetch.

use crate::record::{RecordId, Snapshot};
use chrono::{DateTime, Utc};
use scorecard_common::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default snapshot location, consumed by the commit step
pub const DEFAULT_SNAPSHOT_PATH: &str = "data/filtered_data.json";

/// Default checkpoint location
pub const DEFAULT_CHECKPOINT_PATH: &str = "data/.sync-checkpoint.json";

/// Progress marker of an interrupted run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Pages `1..=last_completed_page` are reflected in the snapshot on disk
    pub last_completed_page: u32,

    /// Ids fetched in those pages
    ///
    /// Absent in checkpoints that only carry the page number. Such a
    /// checkpoint cannot drive the final removal pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_ids: Option<BTreeSet<RecordId>>,

    /// Filter the interrupted run was using
    #[serde(default)]
    pub filter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(
        last_completed_page: u32,
        seen_ids: BTreeSet<RecordId>,
        filter: Option<String>,
    ) -> Self {
        Self {
            last_completed_page,
            seen_ids: Some(seen_ids),
            filter,
            saved_at: Some(Utc::now()),
        }
    }

    /// Whether this checkpoint marks an interrupted run
    pub fn is_resume(&self) -> bool {
        self.last_completed_page > 0
    }

    /// First page the next run should request
    pub fn next_page(&self) -> u32 {
        self.last_completed_page.saturating_add(1)
    }
}

/// Where a loaded snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Parsed from the snapshot file
    File,
    /// No snapshot file yet
    Missing,
    /// The file existed but could not be read; its content was dropped
    Discarded,
}

impl SnapshotOrigin {
    /// Whether the loaded snapshot reflects what an earlier run wrote
    pub fn is_intact(self) -> bool {
        self == SnapshotOrigin::File
    }
}

/// The JSON array of canonical records
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, or an empty one if the file is absent or unreadable
    pub fn load(&self) -> (Snapshot, SnapshotOrigin) {
        match read_json::<Snapshot>(&self.path) {
            Ok(Some(snapshot)) => {
                info!(path = %self.path.display(), records = snapshot.len(), "Loaded snapshot");
                (snapshot, SnapshotOrigin::File)
            },
            Ok(None) => {
                info!(path = %self.path.display(), "No snapshot found, starting fresh");
                (Snapshot::new(), SnapshotOrigin::Missing)
            },
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discarding unreadable snapshot, starting fresh"
                );
                (Snapshot::new(), SnapshotOrigin::Discarded)
            },
        }
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        write_json_atomic(&self.path, snapshot)?;
        debug!(path = %self.path.display(), records = snapshot.len(), "Wrote snapshot");
        Ok(())
    }
}

/// The resume marker next to the snapshot
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint; page 0 when absent or unreadable
    pub fn load(&self) -> Checkpoint {
        match read_json::<Checkpoint>(&self.path) {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => Checkpoint::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable checkpoint");
                Checkpoint::default()
            },
        }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        write_json_atomic(&self.path, checkpoint)?;
        debug!(
            path = %self.path.display(),
            page = checkpoint.last_completed_page,
            "Advanced checkpoint"
        );
        Ok(())
    }

    /// Remove the checkpoint; a no-op when it does not exist
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Cleared checkpoint");
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a JSON document; `Ok(None)` when the file does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SyncError::parse(format!("{}: {}", path.display(), e)))
}

/// Replace `path` with the pretty-printed JSON of `value`
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| SyncError::Io(e.error))?;

    Ok(())
}
