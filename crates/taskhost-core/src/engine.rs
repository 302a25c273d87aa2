//! Task engine construction seam.
//!
//! Bootstrap hands the finalized capability set and the loaded task
//! snapshot to engine construction exactly once, after reconciliation. The
//! engine itself (container creation, health checks, placement) lives
//! behind these traits; this crate only defines the handoff.

use thiserror::Error;

use crate::state::TaskSnapshot;

/// The finalized capability set, frozen for the process lifetime.
///
/// Produced once by bootstrap reconciliation; after engine construction no
/// writer exists, so any number of task-management workers may read it
/// without synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCapabilities {
    /// Whether task state is checkpointed to disk.
    pub checkpoint: bool,
    /// Whether tasks run with per-task resource limits.
    pub task_resource_limits: bool,
}

/// Handle to a constructed task engine.
pub trait TaskEngine: Send {
    /// The capability set the engine was constructed with.
    fn capabilities(&self) -> ResolvedCapabilities;

    /// Identifiers of the checkpointed tasks the engine resumed managing.
    fn resumed_tasks(&self) -> &[String];
}

/// Constructs the task engine from finalized flags and the loaded snapshot.
///
/// Called exactly once per process, after bootstrap reaches the reconciled
/// state. Implementations must not re-evaluate capability flags; the
/// resolved set is authoritative.
pub trait TaskEngineFactory {
    /// Engine handle type produced on success.
    type Engine: TaskEngine;

    /// Construct the engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the engine cannot be constructed;
    /// bootstrap treats this as fatal.
    fn construct(
        &self,
        capabilities: ResolvedCapabilities,
        snapshot: TaskSnapshot,
    ) -> Result<Self::Engine, EngineError>;
}

/// Task engine construction failure.
#[derive(Debug, Error)]
#[error("task engine construction failed: {0}")]
pub struct EngineError(pub String);
