//! File-backed checkpoint state store.
//!
//! The checkpoint is a single JSON document holding the task records and the
//! state of every registered saveable. Saves are atomic: the document is
//! written to a temporary file in the checkpoint's directory and renamed
//! over the previous checkpoint, so a crash mid-save never leaves a torn
//! file behind.
//!
//! Schema evolution is additive. Version 1 checkpoints predate the per-task
//! `resource_limits_applied` attribute; loading one yields records with the
//! attribute defaulted to `false`, which downstream reconciliation treats as
//! "predates the capability". A checkpoint with a version newer than this
//! agent understands is refused.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Saveable, StateStore, StateStoreError, TaskSnapshot};

/// Highest checkpoint schema version this agent reads and writes.
///
/// Version 1 predates `resource_limits_applied`; version 2 added it.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 2;

/// On-disk checkpoint document.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    /// Schema version the writer understood.
    schema_version: u32,

    /// When the checkpoint was written.
    saved_at: DateTime<Utc>,

    /// Persisted task records.
    #[serde(default)]
    tasks: TaskSnapshot,

    /// State of registered saveables, keyed by registration name.
    #[serde(default)]
    saveables: BTreeMap<String, serde_json::Value>,
}

/// JSON-file checkpoint store.
pub struct CheckpointStore {
    path: PathBuf,
    saveables: Vec<(String, Arc<dyn Saveable>)>,
    /// Snapshot retained from the last load, written back on save.
    snapshot: TaskSnapshot,
}

impl CheckpointStore {
    /// Create a store backed by the given checkpoint file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saveables: Vec::new(),
            snapshot: TaskSnapshot::default(),
        }
    }

    /// The checkpoint file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<CheckpointDocument>, StateStoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StateStoreError::Io(err)),
        };

        let document: CheckpointDocument =
            serde_json::from_str(&content).map_err(StateStoreError::Decode)?;

        if document.schema_version > CHECKPOINT_SCHEMA_VERSION {
            return Err(StateStoreError::UnsupportedSchema {
                found: document.schema_version,
                supported: CHECKPOINT_SCHEMA_VERSION,
            });
        }

        Ok(Some(document))
    }

    fn write_document(&self, document: &CheckpointDocument) -> Result<(), StateStoreError> {
        let encoded = serde_json::to_vec_pretty(document).map_err(StateStoreError::Encode)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write-then-rename within the checkpoint directory so readers only
        // ever observe a complete document.
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }
}

impl StateStore for CheckpointStore {
    fn register_saveable(&mut self, name: &str, saveable: Arc<dyn Saveable>) {
        debug!(name, "registered saveable");
        self.saveables.push((name.to_string(), saveable));
    }

    fn load(&mut self) -> Result<TaskSnapshot, StateStoreError> {
        match self.read_document()? {
            Some(document) => {
                info!(
                    path = %self.path.display(),
                    schema_version = document.schema_version,
                    tasks = document.tasks.len(),
                    "loaded checkpoint"
                );
                self.snapshot = document.tasks.clone();
                Ok(document.tasks)
            },
            None => {
                info!(path = %self.path.display(), "no checkpoint found, starting fresh");
                self.snapshot = TaskSnapshot::default();
                Ok(TaskSnapshot::default())
            },
        }
    }

    fn save(&self) -> Result<(), StateStoreError> {
        let document = CheckpointDocument {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            saved_at: Utc::now(),
            tasks: self.snapshot.clone(),
            saveables: self
                .saveables
                .iter()
                .map(|(name, saveable)| (name.clone(), saveable.to_json()))
                .collect(),
        };

        self.write_document(&document)?;
        debug!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }
}
