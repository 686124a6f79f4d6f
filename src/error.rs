//! Error types for peerlink.
//!
//! All errors are strongly typed using thiserror. Consumer-facing operations
//! resolve to one of these values; programming errors (`RegistryViolation`)
//! are asserted in debug builds and logged in release builds instead of being
//! surfaced through the public result types.

use thiserror::Error;

use crate::state::ActivationState;
use crate::stream::{StreamKind, SubscriberId};

/// Failures reported by the external session primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Counterpart unavailable: {message}")]
    Unavailable {
        message: String,
    },

    #[error("Payload rejected by session: {message}")]
    Rejected {
        message: String,
    },

    #[error("Session not activated")]
    NotActivated,

    #[error("Session error: {message}")]
    Session {
        message: String,
    },
}

/// Failures surfaced to callers of `send`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendFailure {
    #[error("Counterpart is not reachable")]
    NotReachable,

    #[error("Failed to encode message: {0}")]
    EncodingFailed(#[source] CodecError),

    #[error("Transport rejected message: {0}")]
    TransportRejected(#[source] TransportError),

    #[error("Observer is closed")]
    Closed,
}

/// Payload encoding and decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload must be a key/value mapping, got {found}")]
    NotAMapping {
        found: &'static str,
    },

    #[error("Value at '{path}' is not property-list safe (null)")]
    UnsupportedValue {
        path: String,
    },

    #[error("Failed to encode '{type_hint}': {message}")]
    Encode {
        type_hint: String,
        message: String,
    },

    #[error("Failed to decode '{type_hint}': {message}")]
    Decode {
        type_hint: String,
        message: String,
    },

    #[error("Decoded value for '{type_hint}' has an unexpected Rust type")]
    TypeMismatch {
        type_hint: String,
    },

    #[error("Type hint '{type_hint}' is already bound to {bound}")]
    HintConflict {
        type_hint: String,
        bound: String,
    },
}

/// Failure half of an activation completion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Activation failed: {message}")]
    Session {
        message: String,
    },

    #[error("Invalid transition from {from} to {attempted}")]
    InvalidTransition {
        from: ActivationState,
        attempted: ActivationState,
    },
}

/// Failures replying to an inbound message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplyError {
    #[error("Sender does not expect a reply")]
    NoReplyExpected,

    #[error("Message was already replied to")]
    AlreadyReplied,
}

/// Defects in the calling code: never part of a consumer-facing result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryViolation {
    #[error("Subscriber {id} registered twice on {kind} stream")]
    DuplicateRegistration {
        kind: StreamKind,
        id: SubscriberId,
    },

    #[error("Subscriber {id} was never registered on {kind} stream")]
    UnknownSubscriber {
        kind: StreamKind,
        id: SubscriberId,
    },
}

/// Top-level error type for peerlink.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Send error: {0}")]
    Send(#[from] SendFailure),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Activation error: {0}")]
    Activation(#[from] ActivationError),

    #[error("Reply error: {0}")]
    Reply(#[from] ReplyError),

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PeerError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a disconnection error for the named channel.
    #[must_use]
    pub fn disconnected(path: impl Into<String>) -> Self {
        Self::Disconnected { path: path.into() }
    }

    /// Returns true if the observer or a stream has gone away.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Send(f) => matches!(
                f,
                SendFailure::NotReachable
                    | SendFailure::TransportRejected(TransportError::Unavailable { .. })
            ),
            _ => false,
        }
    }
}

/// Result type alias for peerlink operations.
pub type PeerResult<T> = Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_failure_wraps_transport_cause() {
        let err = SendFailure::TransportRejected(TransportError::Rejected {
            message: "payload too large".to_string(),
        });
        let msg = format!("{err}");
        assert!(msg.contains("Transport rejected"));
        assert!(msg.contains("payload too large"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = ActivationError::InvalidTransition {
            from: ActivationState::Deactivated,
            attempted: ActivationState::Activated,
        };
        let msg = format!("{err}");
        assert!(msg.contains("deactivated"));
        assert!(msg.contains("activated"));
    }

    #[test]
    fn test_registry_violation_names_kind() {
        let err = RegistryViolation::UnknownSubscriber {
            kind: StreamKind::Reachability,
            id: SubscriberId::new(),
        };
        assert!(format!("{err}").contains("reachability"));
    }

    #[test]
    fn test_peer_error_retryable() {
        let err: PeerError = SendFailure::NotReachable.into();
        assert!(err.is_retryable());

        let err: PeerError = SendFailure::EncodingFailed(CodecError::NotAMapping { found: "array" }).into();
        assert!(!err.is_retryable());

        let err = PeerError::Timeout { duration_ms: 10 };
        assert!(err.is_timeout());
        assert!(err.is_retryable());

        let err = PeerError::disconnected("reachability_stream");
        assert!(err.is_disconnected());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_hint_conflict_names_bound_type() {
        let err: PeerError = CodecError::HintConflict {
            type_hint: "Ack".to_string(),
            bound: "app::Ack".to_string(),
        }
        .into();
        let msg = format!("{err}");
        assert!(msg.contains("'Ack'"));
        assert!(msg.contains("app::Ack"));
    }

    #[test]
    fn test_peer_error_internal() {
        let err = PeerError::internal("worker spawn failed");
        assert!(format!("{err}").contains("worker spawn failed"));
    }
}
