//! Diagnostics reporting and counters.
//!
//! Conditions the observer absorbs instead of surfacing to a caller (decode
//! failures, rejected transitions, programming errors, transport failures)
//! are reported to a `DiagnosticsSink`. The default sink logs through
//! `tracing`; `MemoryDiagnostics` keeps records for inspection.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::logging::events;
use crate::message::DeliveryIntent;
use crate::state::ActivationState;

/// What happened.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// An inbound message had a decoder but failed to decode.
    DecodeFailed {
        message_id: Uuid,
        type_hint: String,
        error: String,
    },

    /// A typed subscriber received a value of another Rust type and skipped it.
    TypeMismatch {
        type_hint: String,
        expected: String,
    },

    /// An event arrived after the terminal state and was dropped.
    TransitionRejected {
        event: String,
        state: ActivationState,
    },

    /// A defect in the calling code.
    ProgrammingError {
        error: String,
    },

    /// The session primitive refused an outbound payload.
    TransportFailed {
        intent: DeliveryIntent,
        error: String,
    },
}

/// A timestamped diagnostic record.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    #[must_use]
    pub fn new(kind: DiagnosticKind) -> Self {
        Self { at: Utc::now(), kind }
    }
}

/// Receives diagnostics. Called from the observer worker and from `send`
/// callers, so implementations must be cheap and must not block.
pub trait DiagnosticsSink: Send + Sync + fmt::Debug {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Logs every diagnostic through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        match &diagnostic.kind {
            DiagnosticKind::DecodeFailed {
                message_id,
                type_hint,
                error,
            } => warn!(
                event = events::MESSAGE_DECODE_FAILED,
                message_id = %message_id,
                type_hint = %type_hint,
                err = %error,
                "typed decode failed; raw subscribers still received the message"
            ),
            DiagnosticKind::TypeMismatch { type_hint, expected } => warn!(
                event = events::MESSAGE_TYPE_MISMATCH,
                type_hint = %type_hint,
                expected = %expected,
                "typed value skipped; it does not match the subscribed type"
            ),
            DiagnosticKind::TransitionRejected { event, state } => warn!(
                event = events::TRANSITION_REJECTED,
                source_event = %event,
                state = %state,
                "event dropped after terminal state"
            ),
            DiagnosticKind::ProgrammingError { error } => error!(
                event = events::PROGRAMMING_ERROR,
                err = %error,
                "programming error"
            ),
            DiagnosticKind::TransportFailed { intent, error } => warn!(
                event = events::SEND_FAILED,
                intent = intent.as_str(),
                err = %error,
                "transport rejected payload"
            ),
        }
    }
}

/// Collects diagnostics in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    records: Mutex<Vec<Diagnostic>>,
}

impl MemoryDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every record so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn report(&self, diagnostic: &Diagnostic) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic.clone());
    }
}

/// Monotonic counters maintained by the observer.
#[derive(Debug, Default)]
pub struct ObserverMetrics {
    events_applied: AtomicU64,
    transitions_rejected: AtomicU64,
    messages_received: AtomicU64,
    decode_failures: AtomicU64,
    sends_attempted: AtomicU64,
    sends_failed: AtomicU64,
    programming_errors: AtomicU64,
}

/// Point-in-time copy of `ObserverMetrics`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub events_applied: u64,
    pub transitions_rejected: u64,
    pub messages_received: u64,
    pub decode_failures: u64,
    pub sends_attempted: u64,
    pub sends_failed: u64,
    pub programming_errors: u64,
}

impl ObserverMetrics {
    pub(crate) fn event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transition_rejected(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn send_attempted(&self) {
        self.sends_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn send_failed(&self) {
        self.sends_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn programming_error(&self) {
        self.programming_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_applied: self.events_applied.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            sends_attempted: self.sends_attempted.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            programming_errors: self.programming_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryDiagnostics::new();
        sink.report(&Diagnostic::new(DiagnosticKind::ProgrammingError {
            error: "first".to_string(),
        }));
        sink.report(&Diagnostic::new(DiagnosticKind::TransitionRejected {
            event: "reachability".to_string(),
            state: ActivationState::Deactivated,
        }));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0].kind, DiagnosticKind::ProgrammingError { .. }));
        assert!(records[0].at <= records[1].at);
    }

    #[test]
    fn diagnostic_serializes_tagged() {
        let d = Diagnostic::new(DiagnosticKind::TransportFailed {
            intent: DeliveryIntent::Interactive,
            error: "gone".to_string(),
        });
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"]["type"], "transport_failed");
        assert_eq!(json["kind"]["intent"], "interactive");
    }

    #[test]
    fn metrics_snapshot_reflects_counters() {
        let metrics = ObserverMetrics::default();
        metrics.event_applied();
        metrics.event_applied();
        metrics.send_attempted();
        metrics.send_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.events_applied, 2);
        assert_eq!(snap.sends_attempted, 1);
        assert_eq!(snap.sends_failed, 1);
        assert_eq!(snap.decode_failures, 0);
    }
}
