//! taskhost-daemon - Host Task Agent Daemon Library
//!
//! This library drives the agent's startup sequence. Each restart it loads
//! the persisted checkpoint, reconciles every gated capability against the
//! tasks the previous incarnation was managing, and hands the finalized
//! capability set to task engine construction.
//!
//! The sequence is strictly linear and runs once, on a single control
//! thread, before any task-management workers exist:
//!
//! ```text
//! Init -> StateLoaded -> Reconciled -> EngineConstructed -> Ready
//!                                 \-> Failed (refusal, load failure, timeout)
//! ```
//!
//! A `Refuse` verdict or an unrecoverable load failure reaches `Failed`
//! with no engine constructed and no partially-applied capability; the
//! binary maps that to a non-zero process exit with the reason surfaced to
//! the operator.
//!
//! # Modules
//!
//! - [`bootstrap`]: the startup state machine and its error surface
//! - [`engine`]: a minimal local task engine behind the construction seam

pub mod bootstrap;
pub mod engine;
