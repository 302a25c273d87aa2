//! Restart-time capability compatibility evaluation.
//!
//! When a capability grows a new per-task attribute, tasks checkpointed
//! before the capability existed cannot be retrofitted with it while
//! running. This module decides, once per restart and per gated capability,
//! whether the capability can be active, reconciling operator intent
//! against the persisted task snapshot.
//!
//! [`evaluate`] is the pure decision kernel; [`apply`] carries its verdict
//! onto the flag and surfaces refusals as fatal errors. The split keeps the
//! decision table testable without any flag mutation or logging.
//!
//! # Decision table
//!
//! ```text
//! incompatible task?  requested             verdict
//! no                  any                   Proceed(flag.enabled())
//! yes                 ExplicitlyEnabled     Refuse (fatal startup error)
//! yes                 ExplicitlyDisabled    Proceed(false)
//! yes                 NotSet                Degrade(false), any polarity
//! ```
//!
//! An empty snapshot has no incompatible tasks: a fresh host takes the
//! capability at its natural value.
//!
//! # Invariants
//!
//! - Evaluation is deterministic and side-effect-free; the same
//!   (flag, snapshot) pair always yields the same verdict.
//! - A degrade may only lower an unset flag, never an explicit one;
//!   [`apply`] overrides the flag only when the verdict's value differs
//!   from the flag's unmodified resolution.
//! - A refusal aborts before any task engine exists. No partial
//!   application.

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::tristate::{FlagContractError, RequestedState, TriStateFlag};
use crate::state::{TaskRecord, TaskSnapshot};

/// Outcome of evaluating one gated capability against the task snapshot.
///
/// Never persisted; computed fresh each restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The capability takes the given effective value; no conflict.
    Proceed(bool),
    /// Silent downgrade to the given effective value. Logged, never fatal.
    Degrade(bool),
    /// Fatal startup conflict with the given human-readable reason.
    Refuse(String),
}

impl Verdict {
    /// The effective value this verdict resolves to, if it resolves at all.
    #[must_use]
    pub fn effective(&self) -> Option<bool> {
        match self {
            Self::Proceed(value) | Self::Degrade(value) => Some(*value),
            Self::Refuse(_) => None,
        }
    }
}

/// Compatibility error surfaced to bootstrap.
#[derive(Debug, Error)]
pub enum CompatError {
    /// The operator explicitly enabled a capability the persisted tasks
    /// cannot support. Not recoverable; the agent must not start.
    #[error("capability {capability} refused: {reason}")]
    Refused {
        /// Name of the refused capability.
        capability: String,
        /// Human-readable refusal reason.
        reason: String,
    },

    /// An override attempt on an explicitly-set flag. A programming error
    /// in bootstrap sequencing; fatal, never recoverable.
    #[error("capability {capability}: {source}")]
    Contract {
        /// Name of the capability whose flag rejected the override.
        capability: String,
        /// The underlying contract violation.
        #[source]
        source: FlagContractError,
    },
}

/// Decide whether a gated capability can be active.
///
/// Pure function of the flag's requested state, its default polarity, and
/// the set predicate "some task fails `compatible`". Snapshot order is
/// irrelevant. `capability` is used only to word the refusal reason.
#[must_use]
pub fn evaluate(
    capability: &str,
    flag: &TriStateFlag,
    snapshot: &TaskSnapshot,
    compatible: impl Fn(&TaskRecord) -> bool,
) -> Verdict {
    let incompatible = snapshot.iter().filter(|task| !compatible(task)).count();

    if incompatible == 0 {
        return Verdict::Proceed(flag.enabled());
    }

    match flag.requested() {
        RequestedState::ExplicitlyEnabled => Verdict::Refuse(format!(
            "capability {capability} is explicitly enabled but {incompatible} checkpointed \
             task(s) predate it; disable the capability or drain the incompatible tasks \
             before restarting the agent"
        )),
        RequestedState::ExplicitlyDisabled => Verdict::Proceed(false),
        // No strong operator intent: preserving the already-running tasks
        // takes precedence over adopting the flag's default polarity.
        RequestedState::NotSet => Verdict::Degrade(false),
    }
}

/// Carry a verdict onto the capability flag.
///
/// Overrides the flag only when the verdict's effective value differs from
/// the flag's unmodified resolution, logs degrades, and returns the
/// finalized effective value.
///
/// # Errors
///
/// Returns [`CompatError::Refused`] for a refusal verdict and
/// [`CompatError::Contract`] if an override hits an explicitly-set flag.
pub fn apply(
    capability: &str,
    verdict: Verdict,
    flag: &mut TriStateFlag,
) -> Result<bool, CompatError> {
    match verdict {
        Verdict::Proceed(value) => {
            if value != flag.enabled() {
                flag.override_enabled(value)
                    .map_err(|source| CompatError::Contract {
                        capability: capability.to_string(),
                        source,
                    })?;
            }
            debug!(capability, enabled = value, "capability reconciled");
            Ok(value)
        },
        Verdict::Degrade(value) => {
            if value != flag.enabled() {
                flag.override_enabled(value)
                    .map_err(|source| CompatError::Contract {
                        capability: capability.to_string(),
                        source,
                    })?;
            }
            warn!(
                capability,
                enabled = value,
                "capability degraded: checkpointed tasks predate it and the operator \
                 expressed no preference"
            );
            Ok(value)
        },
        Verdict::Refuse(reason) => Err(CompatError::Refused {
            capability: capability.to_string(),
            reason,
        }),
    }
}
