//! Outbound routing.
//!
//! `send` is split in three steps so that only the decision needs the
//! observer's serialized state: encode on the caller's thread, decide the
//! path on the worker against the current snapshot, then hand the payload to
//! the session on the caller's thread again.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, ObserverMetrics};
use crate::error::SendFailure;
use crate::logging::events;
use crate::message::{DeliveryIntent, OutboundMessage};
use crate::payload::Payload;
use crate::session::ConnectivitySession;
use crate::state::ConnectivityState;

/// Chooses the delivery path for an outbound message.
pub trait RoutingPolicy: Send + Sync + fmt::Debug {
    /// Returns the intent the session primitive is invoked with, or the reason
    /// the message cannot be sent in `state`.
    fn route(&self, intent: DeliveryIntent, state: &ConnectivityState) -> Result<DeliveryIntent, SendFailure>;
}

/// Default policy.
///
/// Evaluated in order:
/// - `Interactive` while reachable uses the interactive path.
/// - `Persisted` uses the application-context path, reachable or not.
/// - Anything else while reachable falls back to the interactive path.
/// - Otherwise `SendFailure::NotReachable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicy;

impl RoutingPolicy for DefaultPolicy {
    fn route(&self, intent: DeliveryIntent, state: &ConnectivityState) -> Result<DeliveryIntent, SendFailure> {
        match intent {
            DeliveryIntent::Interactive if state.is_reachable => Ok(DeliveryIntent::Interactive),
            DeliveryIntent::Persisted => Ok(DeliveryIntent::Persisted),
            _ if state.is_reachable => Ok(DeliveryIntent::Interactive),
            _ => Err(SendFailure::NotReachable),
        }
    }
}

/// Encodes, routes and dispatches outbound messages.
pub struct MessageRouter {
    policy: Box<dyn RoutingPolicy>,
    session: Arc<dyn ConnectivitySession>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    metrics: Arc<ObserverMetrics>,
}

impl MessageRouter {
    pub fn new(
        policy: Box<dyn RoutingPolicy>,
        session: Arc<dyn ConnectivitySession>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        metrics: Arc<ObserverMetrics>,
    ) -> Self {
        Self {
            policy,
            session,
            diagnostics,
            metrics,
        }
    }

    /// Encodes the message body. Typed bodies that fail to encode never reach
    /// the transport.
    pub fn encode(&self, message: &OutboundMessage) -> Result<Payload, SendFailure> {
        message.encode().map_err(SendFailure::EncodingFailed)
    }

    /// Applies the routing policy.
    pub fn route(&self, intent: DeliveryIntent, state: &ConnectivityState) -> Result<DeliveryIntent, SendFailure> {
        let path = self.policy.route(intent, state)?;
        debug!(
            event = events::SEND_ROUTED,
            component = "message_router",
            intent = intent.as_str(),
            path = path.as_str(),
            reachable = state.is_reachable,
        );
        Ok(path)
    }

    /// Hands the payload to the session on `path`. Failures are wrapped, never
    /// retried.
    pub fn dispatch(&self, payload: &Payload, path: DeliveryIntent) -> Result<(), SendFailure> {
        match self.session.send(payload, path) {
            Ok(()) => {
                debug!(event = events::SEND_OK, component = "message_router", path = path.as_str());
                Ok(())
            }
            Err(err) => {
                self.diagnostics.report(&Diagnostic::new(DiagnosticKind::TransportFailed {
                    intent: path,
                    error: err.to_string(),
                }));
                Err(SendFailure::TransportRejected(err))
            }
        }
    }

    /// Runs encode, `decide` and dispatch in order and counts the outcome.
    ///
    /// `decide` maps the message's intent to a path; the observer passes a
    /// closure that asks its worker, which ends up in [`MessageRouter::route`].
    /// It is not called when encoding fails.
    pub fn send(
        &self,
        message: &OutboundMessage,
        decide: impl FnOnce(DeliveryIntent) -> Result<DeliveryIntent, SendFailure>,
    ) -> Result<(), SendFailure> {
        self.metrics.send_attempted();
        let result = self.encode(message).and_then(|payload| {
            let path = decide(message.intent())?;
            self.dispatch(&payload, path)
        });
        if result.is_err() {
            self.metrics.send_failed();
        }
        result
    }
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use crate::diagnostics::MemoryDiagnostics;
    use crate::error::TransportError;
    use crate::payload::Messagable;
    use crate::session::MockSession;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Note {
        text: Option<String>,
    }

    impl Messagable for Note {
        const TYPE_HINT: &'static str = "Note";
    }

    fn router_with_metrics() -> (MessageRouter, Arc<MockSession>, Arc<MemoryDiagnostics>, Arc<ObserverMetrics>) {
        let session = Arc::new(MockSession::new());
        let diagnostics = Arc::new(MemoryDiagnostics::new());
        let metrics = Arc::new(ObserverMetrics::default());
        let router = MessageRouter::new(Box::new(DefaultPolicy), session.clone(), diagnostics.clone(), metrics.clone());
        (router, session, diagnostics, metrics)
    }

    fn router() -> (MessageRouter, Arc<MockSession>, Arc<MemoryDiagnostics>) {
        let (router, session, diagnostics, _) = router_with_metrics();
        (router, session, diagnostics)
    }

    fn reachable() -> ConnectivityState {
        ConnectivityState::default().with_reachability(true)
    }

    fn send_in(router: &MessageRouter, message: &OutboundMessage, state: &ConnectivityState) -> Result<(), SendFailure> {
        router.send(message, |intent| router.route(intent, state))
    }

    #[test]
    fn default_policy_table() {
        let policy = DefaultPolicy;
        let up = reachable();
        let down = ConnectivityState::default();

        assert_eq!(policy.route(DeliveryIntent::Interactive, &up), Ok(DeliveryIntent::Interactive));
        assert_eq!(policy.route(DeliveryIntent::Interactive, &down), Err(SendFailure::NotReachable));
        assert_eq!(policy.route(DeliveryIntent::Persisted, &up), Ok(DeliveryIntent::Persisted));
        assert_eq!(policy.route(DeliveryIntent::Persisted, &down), Ok(DeliveryIntent::Persisted));
        assert_eq!(policy.route(DeliveryIntent::Queued, &up), Ok(DeliveryIntent::Interactive));
        assert_eq!(policy.route(DeliveryIntent::Queued, &down), Err(SendFailure::NotReachable));
    }

    #[test]
    fn persisted_send_succeeds_while_unreachable() {
        let (router, session, _) = router();
        let payload = Payload::from_json(json!({"score": 3})).unwrap();
        send_in(
            &router,
            &OutboundMessage::raw(payload.clone(), DeliveryIntent::Persisted),
            &ConnectivityState::default(),
        )
        .unwrap();
        assert_eq!(session.sent()[0].payload, payload);
        assert_eq!(session.sent()[0].intent, DeliveryIntent::Persisted);
    }

    #[test]
    fn encode_failure_skips_transport() {
        let (router, session, _, metrics) = router_with_metrics();
        let err = router
            .send(
                &OutboundMessage::typed(Note { text: None }, DeliveryIntent::Interactive),
                |_| panic!("routing must not run for a message that failed to encode"),
            )
            .unwrap_err();
        assert!(matches!(err, SendFailure::EncodingFailed(_)));
        assert!(session.sent().is_empty());
        assert_eq!(metrics.snapshot().sends_failed, 1);
    }

    #[test]
    fn routing_failure_skips_transport_and_is_counted() {
        let (router, session, diagnostics, metrics) = router_with_metrics();
        let message = OutboundMessage::raw(Payload::new(), DeliveryIntent::Interactive);

        assert_eq!(
            send_in(&router, &message, &ConnectivityState::default()),
            Err(SendFailure::NotReachable)
        );
        assert_eq!(router.send(&message, |_| Err(SendFailure::Closed)), Err(SendFailure::Closed));
        send_in(&router, &message, &reachable()).unwrap();

        assert_eq!(session.sent().len(), 1);
        assert!(diagnostics.is_empty());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sends_attempted, 3);
        assert_eq!(snapshot.sends_failed, 2);
    }

    #[test]
    fn transport_failure_is_wrapped_and_reported() {
        let (router, session, diagnostics) = router();
        session.set_send_failure(Some(TransportError::Rejected {
            message: "payload too large".to_string(),
        }));

        let err = send_in(&router, &OutboundMessage::raw(Payload::new(), DeliveryIntent::Queued), &reachable())
            .unwrap_err();
        assert_eq!(
            err,
            SendFailure::TransportRejected(TransportError::Rejected {
                message: "payload too large".to_string()
            })
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.records()[0].kind,
            DiagnosticKind::TransportFailed {
                intent: DeliveryIntent::Interactive,
                ..
            }
        ));
    }

    #[derive(Debug)]
    struct PersistEverything;

    impl RoutingPolicy for PersistEverything {
        fn route(&self, _intent: DeliveryIntent, _state: &ConnectivityState) -> Result<DeliveryIntent, SendFailure> {
            Ok(DeliveryIntent::Persisted)
        }
    }

    #[test]
    fn custom_policy_is_honored() {
        let session = Arc::new(MockSession::new());
        let router = MessageRouter::new(
            Box::new(PersistEverything),
            session.clone(),
            Arc::new(MemoryDiagnostics::new()),
            Arc::new(ObserverMetrics::default()),
        );
        send_in(
            &router,
            &OutboundMessage::raw(Payload::new(), DeliveryIntent::Interactive),
            &ConnectivityState::default(),
        )
        .unwrap();
        assert_eq!(session.sent()[0].intent, DeliveryIntent::Persisted);
    }
}
