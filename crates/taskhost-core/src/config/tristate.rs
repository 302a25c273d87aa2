//! Tri-state capability flags.
//!
//! A tri-state flag distinguishes "operator said nothing" from both explicit
//! polarities. A plain boolean-with-default cannot express that difference,
//! and the compatibility evaluator needs it: an unset flag may be silently
//! downgraded to preserve already-running tasks, while an explicit request
//! must either be honored or refused outright.
//!
//! # Contracts
//!
//! - `requested` is immutable after configuration load; only
//!   [`TriStateFlag::override_enabled`] changes the effective value, and only
//!   while the requested state is [`RequestedState::NotSet`].
//! - Overriding an explicitly-set flag is a contract violation and is
//!   rejected with [`FlagContractError`], never silently accepted, because it
//!   would mask operator intent.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operator-requested state of a capability flag.
///
/// Serde round-trips this as an optional boolean: an absent key is
/// [`RequestedState::NotSet`], so configuration written before the flag
/// existed parses without change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestedState {
    /// The operator expressed no preference.
    #[default]
    NotSet,
    /// The operator explicitly enabled the capability.
    ExplicitlyEnabled,
    /// The operator explicitly disabled the capability.
    ExplicitlyDisabled,
}

impl RequestedState {
    /// Whether the operator expressed no preference.
    #[must_use]
    pub const fn is_not_set(&self) -> bool {
        matches!(self, Self::NotSet)
    }
}

impl Serialize for RequestedState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::NotSet => serializer.serialize_none(),
            Self::ExplicitlyEnabled => serializer.serialize_bool(true),
            Self::ExplicitlyDisabled => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for RequestedState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<bool>::deserialize(deserializer)? {
            None => Self::NotSet,
            Some(true) => Self::ExplicitlyEnabled,
            Some(false) => Self::ExplicitlyDisabled,
        })
    }
}

/// Value a flag resolves to when the operator said nothing.
///
/// Fixed per flag instance at declaration, never per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPolarity {
    /// Unset resolves to enabled.
    DefaultTrue,
    /// Unset resolves to disabled.
    DefaultFalse,
}

/// Error returned when an override would mask operator intent.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot override a capability flag the operator set to {requested:?}")]
pub struct FlagContractError {
    /// The explicit requested state that blocked the override.
    pub requested: RequestedState,
}

/// A capability flag with tri-state requested value and fixed default
/// polarity.
///
/// Constructed once from configuration at process start; read many times.
/// The only permitted mutation is [`Self::override_enabled`], invoked by the
/// compatibility evaluator during bootstrap reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriStateFlag {
    requested: RequestedState,
    polarity: DefaultPolarity,
    overridden: Option<bool>,
}

impl TriStateFlag {
    /// Create a flag with the given requested state and default polarity.
    #[must_use]
    pub const fn new(requested: RequestedState, polarity: DefaultPolarity) -> Self {
        Self {
            requested,
            polarity,
            overridden: None,
        }
    }

    /// Create a flag that resolves to enabled when not set.
    #[must_use]
    pub const fn default_true(requested: RequestedState) -> Self {
        Self::new(requested, DefaultPolarity::DefaultTrue)
    }

    /// Create a flag that resolves to disabled when not set.
    #[must_use]
    pub const fn default_false(requested: RequestedState) -> Self {
        Self::new(requested, DefaultPolarity::DefaultFalse)
    }

    /// The operator-requested state, immutable after configuration load.
    #[must_use]
    pub const fn requested(&self) -> RequestedState {
        self.requested
    }

    /// The declared default polarity.
    #[must_use]
    pub const fn polarity(&self) -> DefaultPolarity {
        self.polarity
    }

    /// Resolve the effective value.
    ///
    /// Explicit requests win; an unset flag resolves to its default polarity
    /// unless the compatibility evaluator overrode it.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        if let Some(value) = self.overridden {
            return value;
        }
        match self.requested {
            RequestedState::ExplicitlyEnabled => true,
            RequestedState::ExplicitlyDisabled => false,
            RequestedState::NotSet => matches!(self.polarity, DefaultPolarity::DefaultTrue),
        }
    }

    /// Override the effective value of an unset flag.
    ///
    /// # Errors
    ///
    /// Returns [`FlagContractError`] if the operator explicitly set the flag.
    /// Callers must treat that as a fatal programming error in bootstrap
    /// sequencing, not a recoverable condition.
    pub fn override_enabled(&mut self, value: bool) -> Result<(), FlagContractError> {
        if !self.requested.is_not_set() {
            return Err(FlagContractError {
                requested: self.requested,
            });
        }
        self.overridden = Some(value);
        Ok(())
    }
}
