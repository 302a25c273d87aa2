//! taskhost-core - Host Task Agent Policy Library
//!
//! This library holds the restart-time policy core of the taskhost agent:
//! the logic that decides, each time the agent process restarts, whether a
//! task-execution capability can be safely turned on given the tasks the
//! agent was managing before the restart.
//!
//! The agent persists task state to a local checkpoint so it can resume
//! managing already-running workloads after a crash or upgrade. When a
//! capability grows a new per-task attribute, tasks checkpointed before the
//! capability existed cannot be retrofitted with it while running. The
//! [`compat`] module reconciles operator intent (an explicit enable/disable
//! request) against the compatibility of the checkpointed tasks.
//!
//! # Modules
//!
//! - [`config`]: agent configuration, including the tri-state capability
//!   flags that distinguish "operator said nothing" from both explicit
//!   polarities
//! - [`state`]: the checkpoint state store and the read-only task snapshot
//!   it materializes at startup
//! - [`compat`]: the compatibility evaluator, a pure decision function over
//!   (flag, snapshot) producing a proceed/degrade/refuse verdict
//! - [`engine`]: the task-engine construction seam handed the finalized
//!   capability set
//!
//! Everything here runs synchronously on the bootstrap control thread,
//! before any concurrent task-management workers exist. No locking is
//! required; once bootstrap finalizes the capability set it is frozen for
//! the process lifetime.

pub mod compat;
pub mod config;
pub mod engine;
pub mod state;
