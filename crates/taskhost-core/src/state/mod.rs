//! Persisted agent state: task records, snapshots, and the state store seam.
//!
//! The state store owns no business policy. It loads whatever was
//! checkpointed before the restart into a read-only [`TaskSnapshot`] exactly
//! once, and saves registered components on request. The compatibility
//! evaluator receives the snapshot as a read-only view and never mutates it.
//!
//! Two implementations are provided: [`CheckpointStore`], backed by a JSON
//! file with atomic writes, and [`InMemoryStateStore`], a hand-written fake
//! for tests.

mod checkpoint;
mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use checkpoint::{CHECKPOINT_SCHEMA_VERSION, CheckpointStore};
pub use memory::InMemoryStateStore;

/// Last known desired status of a persisted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesiredStatus {
    /// The task should be running.
    Running,
    /// The task is draining toward stopped.
    Stopped,
}

/// One task the agent was tracking before restart.
///
/// `resource_limits_applied` is the capability-compatibility attribute:
/// records checkpointed before the resource-limits capability existed lack
/// the field and deserialize to `false`, marking the task as predating the
/// capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Stable task identifier.
    pub task_id: String,

    /// When the task was created.
    pub created_at: DateTime<Utc>,

    /// Last known desired status.
    pub desired_status: DesiredStatus,

    /// Whether the task was created under per-task resource limit
    /// semantics. Absent in pre-capability checkpoints.
    #[serde(default)]
    pub resource_limits_applied: bool,
}

impl TaskRecord {
    /// Create a running task record.
    #[must_use]
    pub fn running(task_id: impl Into<String>, resource_limits_applied: bool) -> Self {
        Self {
            task_id: task_id.into(),
            created_at: Utc::now(),
            desired_status: DesiredStatus::Running,
            resource_limits_applied,
        }
    }
}

/// Read-only view of every task known to the agent after a load.
///
/// Ordering carries no meaning; every decision over the snapshot is a set
/// predicate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskSnapshot {
    tasks: Vec<TaskRecord>,
}

impl TaskSnapshot {
    /// Create a snapshot from task records.
    #[must_use]
    pub fn new(tasks: Vec<TaskRecord>) -> Self {
        Self { tasks }
    }

    /// Iterate over the task records.
    pub fn iter(&self) -> std::slice::Iter<'_, TaskRecord> {
        self.tasks.iter()
    }

    /// Number of tasks in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the snapshot holds no tasks (fresh host).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task identifiers, in checkpoint order.
    #[must_use]
    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|task| task.task_id.clone()).collect()
    }
}

impl FromIterator<TaskRecord> for TaskSnapshot {
    fn from_iter<I: IntoIterator<Item = TaskRecord>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a TaskSnapshot {
    type Item = &'a TaskRecord;
    type IntoIter = std::slice::Iter<'a, TaskRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

/// A component whose state is written into the checkpoint on save.
pub trait Saveable: Send + Sync {
    /// Serialize the component's current state.
    fn to_json(&self) -> serde_json::Value;
}

/// The persisted-state seam consumed by agent bootstrap.
///
/// Invoked once, synchronously, at startup, before task engine
/// construction. Implementations may block in `load`; the caller bounds it
/// with the startup timeout.
pub trait StateStore: Send {
    /// Register a component to be included in subsequent saves.
    fn register_saveable(&mut self, name: &str, saveable: Arc<dyn Saveable>);

    /// Materialize the persisted task snapshot.
    ///
    /// A missing checkpoint is a fresh host and yields an empty snapshot;
    /// only unreadable or undecodable state is an error.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] if persisted state exists but cannot be
    /// read or decoded.
    fn load(&mut self) -> Result<TaskSnapshot, StateStoreError>;

    /// Persist the current state.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] if the state cannot be encoded or
    /// written.
    fn save(&self) -> Result<(), StateStoreError>;
}

/// State store error.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// I/O error reading or writing the checkpoint.
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The checkpoint exists but cannot be decoded.
    #[error("failed to decode checkpoint: {0}")]
    Decode(serde_json::Error),

    /// The checkpoint cannot be encoded.
    #[error("failed to encode checkpoint: {0}")]
    Encode(serde_json::Error),

    /// The checkpoint was written by a newer agent.
    #[error("checkpoint schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema {
        /// Version found in the checkpoint file.
        found: u32,
        /// Highest version this agent understands.
        supported: u32,
    },

    /// The store cannot serve the request.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_capability_record_deserializes_incompatible() {
        // A record checkpointed before the capability existed has no
        // resource_limits_applied field.
        let json = r#"{
            "task_id": "task-1",
            "created_at": "2026-01-10T12:00:00Z",
            "desired_status": "RUNNING"
        }"#;

        let record: TaskRecord = serde_json::from_str(json).unwrap();
        assert!(!record.resource_limits_applied);
    }

    #[test]
    fn snapshot_set_predicates_ignore_order() {
        let forward = TaskSnapshot::new(vec![
            TaskRecord::running("a", false),
            TaskRecord::running("b", true),
        ]);
        let reversed: TaskSnapshot = forward.iter().rev().cloned().collect();

        let lacking = |snapshot: &TaskSnapshot| {
            snapshot
                .iter()
                .any(|task: &TaskRecord| !task.resource_limits_applied)
        };
        assert_eq!(lacking(&forward), lacking(&reversed));
        assert_eq!(forward.len(), reversed.len());
    }

    #[test]
    fn empty_snapshot_is_fresh_host() {
        let snapshot = TaskSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.len(), 0);
        assert!(snapshot.task_ids().is_empty());
    }
}
