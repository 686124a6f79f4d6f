//! Connectivity state snapshots.
//!
//! A `ConnectivityState` is an immutable value. The state manager never edits
//! one in place; every applied event produces a new snapshot with only the
//! affected fields replaced.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ActivationError;

/// Activation lifecycle of the connectivity session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    #[default]
    NotActivated,
    Activating,
    Activated,
    /// Terminal: no further transitions are accepted.
    Deactivated,
}

impl ActivationState {
    /// Returns true once no further transitions are accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deactivated)
    }

    /// Stable lowercase name, used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotActivated => "not_activated",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Deactivated => "deactivated",
        }
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of everything consumers know about the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ConnectivityState {
    pub activation_state: ActivationState,
    pub is_reachable: bool,
    /// A watch-style peer device is paired.
    pub is_paired: bool,
    /// The companion app is installed on the peer.
    pub is_installed: bool,
}

impl ConnectivityState {
    /// Returns true once the session reached `Deactivated`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.activation_state.is_terminal()
    }

    #[must_use]
    pub const fn with_activation(self, activation_state: ActivationState) -> Self {
        Self {
            activation_state,
            ..self
        }
    }

    #[must_use]
    pub const fn with_reachability(self, is_reachable: bool) -> Self {
        Self { is_reachable, ..self }
    }

    #[must_use]
    pub const fn with_pairing(self, is_paired: bool, is_installed: bool) -> Self {
        Self {
            is_paired,
            is_installed,
            ..self
        }
    }
}

/// Result of one activation attempt.
pub type ActivationCompletion = Result<ConnectivityState, ActivationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_inactive_and_unreachable() {
        let state = ConnectivityState::default();
        assert_eq!(state.activation_state, ActivationState::NotActivated);
        assert!(!state.is_reachable);
        assert!(!state.is_paired);
        assert!(!state.is_installed);
        assert!(!state.is_terminal());
    }

    #[test]
    fn with_methods_replace_only_their_fields() {
        let base = ConnectivityState::default()
            .with_activation(ActivationState::Activated)
            .with_pairing(true, true);

        let reachable = base.with_reachability(true);
        assert_eq!(reachable.activation_state, ActivationState::Activated);
        assert!(reachable.is_paired && reachable.is_installed);
        assert!(reachable.is_reachable);
        // Original value is untouched.
        assert!(!base.is_reachable);
    }

    #[test]
    fn only_deactivated_is_terminal() {
        assert!(ActivationState::Deactivated.is_terminal());
        assert!(!ActivationState::Activated.is_terminal());
        assert!(!ActivationState::Activating.is_terminal());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_value(ConnectivityState::default().with_activation(ActivationState::NotActivated))
            .unwrap();
        assert_eq!(json["activation_state"], "not_activated");
    }
}
