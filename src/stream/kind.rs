//! Stream kinds and subscriber identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a subscriber handle.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Create a new random subscriber id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The closed set of observable value categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Full `ConnectivityState` snapshots.
    ActivationState,
    /// One result per activation attempt.
    ActivationCompletion,
    /// Reachability booleans.
    Reachability,
    /// Every inbound message, undecoded.
    RawMessage,
    /// Inbound messages decoded to a registered type.
    TypedMessage,
}

impl StreamKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::ActivationState,
        Self::ActivationCompletion,
        Self::Reachability,
        Self::RawMessage,
        Self::TypedMessage,
    ];

    /// Kinds that deliver the current value to every new subscriber.
    #[must_use]
    pub const fn replays_current(self) -> bool {
        matches!(self, Self::ActivationState | Self::Reachability)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActivationState => "activation_state",
            Self::ActivationCompletion => "activation_completion",
            Self::Reachability => "reachability",
            Self::RawMessage => "raw_message",
            Self::TypedMessage => "typed_message",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
