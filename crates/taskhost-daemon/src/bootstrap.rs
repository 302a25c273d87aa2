//! Agent bootstrap sequencing.
//!
//! Expresses the startup state machine as explicit sequential calls
//! returning results, not shared mutable globals: create the state store,
//! load persisted state under the startup timeout, reconcile gated
//! capabilities against the loaded snapshot, construct the task engine with
//! the finalized flags.
//!
//! # Failure semantics
//!
//! - A `Refuse` verdict from reconciliation is fatal. The first refusal
//!   aborts; later stages depend on the finalized capability set, so there
//!   is nothing useful to evaluate past it.
//! - A load failure consults the configured [`LoadFailurePolicy`]: `fail`
//!   aborts, `start-clean` proceeds with an empty snapshot. This is the
//!   single explicit decision point for that policy.
//! - A load that exceeds `startup_load_timeout` always aborts. A hung store
//!   must not silently become a clean start.
//! - After the engine is constructed the capability set is frozen; nothing
//!   re-reads or re-evaluates flags for the process lifetime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use taskhost_core::compat::{self, CompatError};
use taskhost_core::config::{AgentConfig, LoadFailurePolicy};
use taskhost_core::engine::{EngineError, ResolvedCapabilities, TaskEngineFactory};
use taskhost_core::state::{Saveable, StateStore, StateStoreError, TaskSnapshot};
use thiserror::Error;
use tracing::{info, warn};

/// Name of the gated capability reconciled at startup.
pub const TASK_RESOURCE_LIMITS: &str = "task-resource-limits";

/// Phases of the bootstrap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Constructing the state store, registering saveables.
    Init,
    /// Persisted state materialized into memory.
    StateLoaded,
    /// Gated capabilities reconciled; flag set finalized.
    Reconciled,
    /// Task engine constructed with the frozen capability set.
    EngineConstructed,
    /// Terminal success.
    Ready,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::StateLoaded => "state-loaded",
            Self::Reconciled => "reconciled",
            Self::EngineConstructed => "engine-constructed",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Bootstrap failure, surfaced to the operator as a fatal startup error.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The state store could not materialize persisted state.
    #[error("state load failed: {0}")]
    StateLoad(#[from] StateStoreError),

    /// The state load did not complete within the startup bound.
    #[error("state load did not complete within {timeout:?}")]
    LoadTimeout {
        /// The configured startup load timeout.
        timeout: Duration,
    },

    /// A gated capability was refused or its flag contract was violated.
    #[error(transparent)]
    Compat(#[from] CompatError),

    /// The task engine could not be constructed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl BootstrapError {
    /// The last phase bootstrap completed before failing.
    #[must_use]
    pub const fn failed_after(&self) -> BootstrapPhase {
        match self {
            Self::StateLoad(_) | Self::LoadTimeout { .. } => BootstrapPhase::Init,
            Self::Compat(_) => BootstrapPhase::StateLoaded,
            Self::Engine(_) => BootstrapPhase::Reconciled,
        }
    }
}

/// The running agent produced by a successful bootstrap.
pub struct ReadyAgent<S, E> {
    /// The state store, retained for subsequent saves.
    pub store: S,
    /// The constructed task engine handle.
    pub engine: E,
    /// The frozen capability set.
    pub capabilities: ResolvedCapabilities,
}

impl<S, E> fmt::Debug for ReadyAgent<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyAgent")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Agent metadata written into the checkpoint alongside task state.
struct AgentMetadata {
    version: &'static str,
    pid: u32,
}

impl AgentMetadata {
    fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            pid: std::process::id(),
        }
    }
}

impl Saveable for AgentMetadata {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "version": self.version,
            "pid": self.pid,
        })
    }
}

/// One-shot bootstrap of the agent.
pub struct AgentBootstrap<S, F> {
    config: AgentConfig,
    store: S,
    factory: F,
}

impl<S, F> AgentBootstrap<S, F>
where
    S: StateStore + 'static,
    F: TaskEngineFactory,
{
    /// Assemble a bootstrap from configuration, state store, and engine
    /// factory.
    pub const fn new(config: AgentConfig, store: S, factory: F) -> Self {
        Self {
            config,
            store,
            factory,
        }
    }

    /// Drive the state machine to `Ready` or fail with no engine
    /// constructed.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError`] on load failure (subject to
    /// `on_load_failure`), load timeout, capability refusal, or engine
    /// construction failure.
    pub async fn run(self) -> Result<ReadyAgent<S, F::Engine>, BootstrapError> {
        let Self {
            config,
            mut store,
            factory,
        } = self;

        info!(phase = %BootstrapPhase::Init, "agent bootstrap starting");
        store.register_saveable("agent-metadata", Arc::new(AgentMetadata::current()));

        let (store, snapshot) = load_state(&config, store).await?;
        info!(
            phase = %BootstrapPhase::StateLoaded,
            tasks = snapshot.len(),
            "persisted state loaded"
        );

        let capabilities = reconcile(&config, &snapshot)?;
        info!(
            phase = %BootstrapPhase::Reconciled,
            checkpoint = capabilities.checkpoint,
            task_resource_limits = capabilities.task_resource_limits,
            "capabilities finalized"
        );

        let engine = factory.construct(capabilities, snapshot)?;
        info!(phase = %BootstrapPhase::EngineConstructed, "task engine constructed");

        info!(phase = %BootstrapPhase::Ready, "agent bootstrap complete");
        Ok(ReadyAgent {
            store,
            engine,
            capabilities,
        })
    }
}

/// Load persisted state under the startup timeout, applying the configured
/// load-failure policy.
async fn load_state<S>(
    config: &AgentConfig,
    store: S,
) -> Result<(S, TaskSnapshot), BootstrapError>
where
    S: StateStore + 'static,
{
    let timeout = config.startup_load_timeout;
    let load = tokio::task::spawn_blocking(move || {
        let mut store = store;
        let result = store.load();
        (store, result)
    });

    let (store, loaded) = match tokio::time::timeout(timeout, load).await {
        Err(_) => return Err(BootstrapError::LoadTimeout { timeout }),
        Ok(Err(join_err)) => {
            return Err(BootstrapError::StateLoad(StateStoreError::Unavailable(
                format!("checkpoint load task failed: {join_err}"),
            )));
        },
        Ok(Ok(parts)) => parts,
    };

    let snapshot = match loaded {
        Ok(snapshot) => snapshot,
        Err(err) => match config.on_load_failure {
            LoadFailurePolicy::Fail => return Err(err.into()),
            LoadFailurePolicy::StartClean => {
                warn!(
                    error = %err,
                    "checkpoint load failed; starting with empty state per \
                     on_load_failure policy"
                );
                TaskSnapshot::default()
            },
        },
    };

    Ok((store, snapshot))
}

/// Reconcile every gated capability against the loaded snapshot and freeze
/// the resolved set.
///
/// Capabilities are evaluated independently; the first refusal aborts.
fn reconcile(
    config: &AgentConfig,
    snapshot: &TaskSnapshot,
) -> Result<ResolvedCapabilities, CompatError> {
    let mut limits_flag = config.task_resource_limits_flag();
    let verdict = compat::evaluate(TASK_RESOURCE_LIMITS, &limits_flag, snapshot, |task| {
        task.resource_limits_applied
    });
    let task_resource_limits = compat::apply(TASK_RESOURCE_LIMITS, verdict, &mut limits_flag)?;

    // The checkpoint flag carries no compatibility dependency on persisted
    // task shape; it resolves to its natural value.
    Ok(ResolvedCapabilities {
        checkpoint: config.checkpoint_flag().enabled(),
        task_resource_limits,
    })
}

#[cfg(test)]
mod tests {
    use taskhost_core::config::RequestedState;
    use taskhost_core::state::TaskRecord;

    use super::*;

    fn config_with_limits(requested: RequestedState) -> AgentConfig {
        AgentConfig {
            task_resource_limits: requested,
            ..AgentConfig::default()
        }
    }

    #[test]
    fn reconcile_degrades_unset_flag_over_legacy_tasks() {
        let snapshot = TaskSnapshot::new(vec![
            TaskRecord::running("old", false),
            TaskRecord::running("new", true),
        ]);
        let capabilities =
            reconcile(&config_with_limits(RequestedState::NotSet), &snapshot).unwrap();
        assert!(!capabilities.task_resource_limits);
    }

    #[test]
    fn reconcile_refuses_explicit_enable_over_legacy_tasks() {
        let snapshot = TaskSnapshot::new(vec![TaskRecord::running("old", false)]);
        let err = reconcile(
            &config_with_limits(RequestedState::ExplicitlyEnabled),
            &snapshot,
        )
        .unwrap_err();
        assert!(matches!(err, CompatError::Refused { .. }), "{err:?}");
    }

    #[test]
    fn reconcile_keeps_natural_default_on_fresh_host() {
        let capabilities = reconcile(
            &config_with_limits(RequestedState::NotSet),
            &TaskSnapshot::default(),
        )
        .unwrap();
        // task_resource_limits is declared default-true; checkpoint
        // default-false.
        assert!(capabilities.task_resource_limits);
        assert!(!capabilities.checkpoint);
    }

    #[test]
    fn reconcile_resolves_checkpoint_flag_naturally() {
        let config = AgentConfig {
            checkpoint: RequestedState::ExplicitlyEnabled,
            ..AgentConfig::default()
        };
        let capabilities = reconcile(&config, &TaskSnapshot::default()).unwrap();
        assert!(capabilities.checkpoint);
    }

    #[test]
    fn error_phase_mapping_tracks_state_machine() {
        let load = BootstrapError::StateLoad(StateStoreError::Unavailable("x".to_string()));
        assert_eq!(load.failed_after(), BootstrapPhase::Init);

        let timeout = BootstrapError::LoadTimeout {
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.failed_after(), BootstrapPhase::Init);

        let refused = BootstrapError::Compat(CompatError::Refused {
            capability: TASK_RESOURCE_LIMITS.to_string(),
            reason: "conflict".to_string(),
        });
        assert_eq!(refused.failed_after(), BootstrapPhase::StateLoaded);

        let engine = BootstrapError::Engine(EngineError("boom".to_string()));
        assert_eq!(engine.failed_after(), BootstrapPhase::Reconciled);
    }
}
