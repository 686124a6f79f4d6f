//! Connectivity observer façade.
//!
//! `ConnectivityObserver` is the single object a session and its consumers
//! talk to. Session callbacks (`did_*`) and stream registrations become
//! commands for a dedicated worker thread; `send` encodes and dispatches on
//! the caller's thread and only asks the worker for the routing decision.

pub mod config;
pub mod manager;
pub(crate) mod worker;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Sender};
use tracing::warn;

use crate::codec::{CodecBinding, CodecRegistry, TypedMessage};
use crate::diagnostics::{DiagnosticsSink, MetricsSnapshot, ObserverMetrics, TracingDiagnostics};
use crate::error::{ActivationError, CodecError, PeerError, PeerResult, SendFailure};
use crate::message::{DeliveryIntent, InboundMessage, OutboundMessage};
use crate::payload::Messagable;
use crate::routing::{DefaultPolicy, MessageDistributor, MessageRouter, RoutingPolicy};
use crate::session::ConnectivitySession;
use crate::state::{ActivationCompletion, ActivationState, ConnectivityState};
use crate::stream::{StreamCoordinator, StreamKind, StreamSink, SubscriberId, Subscription, TypedSubscription};

pub use config::{ObserverConfig, PublishPolicy};
pub use manager::{ActivationRequest, ConnectivityStateManager, Transition};

use worker::{Command, Worker};

const CONTROL_PATH: &str = "observer_commands";

/// Wires a session, codecs, routing policy and diagnostics into an observer.
pub struct ObserverBuilder {
    session: Arc<dyn ConnectivitySession>,
    config: ObserverConfig,
    codecs: CodecRegistry,
    codec_conflict: Option<CodecError>,
    policy: Box<dyn RoutingPolicy>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl ObserverBuilder {
    pub fn new(session: Arc<dyn ConnectivitySession>) -> Self {
        Self {
            session,
            config: ObserverConfig::default(),
            codecs: CodecRegistry::new(),
            codec_conflict: None,
            policy: Box::new(DefaultPolicy),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ObserverConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers `T` so inbound messages of that type are decoded even before
    /// anyone subscribes to it.
    ///
    /// Registering two types under one hint makes `build` fail.
    #[must_use]
    pub fn codec<T: Messagable>(mut self) -> Self {
        if let Err(err) = self.codecs.register::<T>() {
            self.codec_conflict.get_or_insert(err);
        }
        self
    }

    #[must_use]
    pub fn routing_policy(mut self, policy: impl RoutingPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = sink;
        self
    }

    /// Spawns the worker thread.
    pub fn build(self) -> PeerResult<ConnectivityObserver> {
        if let Some(conflict) = self.codec_conflict {
            return Err(conflict.into());
        }

        let metrics = Arc::new(ObserverMetrics::default());
        let router = Arc::new(MessageRouter::new(
            self.policy,
            Arc::clone(&self.session),
            Arc::clone(&self.diagnostics),
            Arc::clone(&metrics),
        ));
        let manager = ConnectivityStateManager::new(
            self.config.publish_policy,
            Arc::clone(&self.diagnostics),
            Arc::clone(&metrics),
        );
        let state = manager.shared_state();
        let worker = Worker {
            manager,
            distributor: MessageDistributor::new(self.codecs, Arc::clone(&self.diagnostics), Arc::clone(&metrics)),
            coordinator: StreamCoordinator::new(),
            router: Arc::clone(&router),
            diagnostics: Arc::clone(&self.diagnostics),
            metrics: Arc::clone(&metrics),
        };

        let (commands, rx) = unbounded::<Command>();
        let join = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker.run(rx))
            .map_err(|e| PeerError::internal(format!("failed to spawn observer worker: {e}")))?;

        Ok(ConnectivityObserver {
            commands,
            state,
            router,
            session: self.session,
            diagnostics: self.diagnostics,
            metrics,
            join: Some(join),
        })
    }
}

impl fmt::Debug for ObserverBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBuilder")
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .field("policy", &self.policy)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

/// Observes one connectivity session and fans its events out to subscribers.
///
/// Every method takes `&self`; share the observer across threads with an
/// `Arc`. Dropping it stops the worker and ends every open subscription.
///
/// `did_*` calls only enqueue: call `flush` before reading `current_state`
/// if the read must reflect them.
pub struct ConnectivityObserver {
    commands: Sender<Command>,
    state: Arc<RwLock<ConnectivityState>>,
    router: Arc<MessageRouter>,
    session: Arc<dyn ConnectivitySession>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    metrics: Arc<ObserverMetrics>,
    join: Option<JoinHandle<()>>,
}

impl ConnectivityObserver {
    /// Observer with default configuration.
    pub fn new(session: Arc<dyn ConnectivitySession>) -> PeerResult<Self> {
        ObserverBuilder::new(session).build()
    }

    pub fn builder(session: Arc<dyn ConnectivitySession>) -> ObserverBuilder {
        ObserverBuilder::new(session)
    }

    // Session callbacks.

    pub fn did_activate(&self, result: Result<ActivationState, ActivationError>) {
        self.notify(Command::Activation(result));
    }

    pub fn did_change_reachability(&self, reachable: bool) {
        self.notify(Command::Reachability(reachable));
    }

    pub fn did_change_pairing(&self, paired: bool, installed: bool) {
        self.notify(Command::Pairing { paired, installed });
    }

    pub fn did_receive_message(&self, message: InboundMessage) {
        self.notify(Command::Message(message));
    }

    /// Requests activation from the session.
    ///
    /// Moves `NotActivated` to `Activating` first. If the session refuses to
    /// start, the attempt is resolved as a failed activation so completion
    /// subscribers still see it end.
    pub fn activate(&self) -> PeerResult<ActivationRequest> {
        let (reply, rx) = bounded(1);
        self.enqueue(Command::BeginActivation { reply })?;
        let request = rx.recv().map_err(|_| PeerError::disconnected(CONTROL_PATH))??;
        if request != ActivationRequest::Started {
            return Ok(request);
        }

        if let Err(err) = self.session.activate() {
            let failure = ActivationError::Session {
                message: err.to_string(),
            };
            self.notify(Command::Activation(Err(failure.clone())));
            return Err(failure.into());
        }
        Ok(request)
    }

    /// Latest applied snapshot.
    #[must_use]
    pub fn current_state(&self) -> ConnectivityState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until every command enqueued before this call has been applied.
    pub fn flush(&self) -> PeerResult<()> {
        let (reply, rx) = bounded(1);
        self.enqueue(Command::Barrier { reply })?;
        rx.recv().map_err(|_| PeerError::disconnected(CONTROL_PATH))
    }

    // Streams.

    /// Activation-state snapshots, starting with the current one.
    pub fn subscribe_activation_state(&self) -> PeerResult<Subscription<ConnectivityState>> {
        self.subscribe(StreamKind::ActivationState, None, None, StreamSink::ActivationState)
    }

    /// Outcome of every activation attempt from now on.
    pub fn subscribe_activation_completion(&self) -> PeerResult<Subscription<ActivationCompletion>> {
        self.subscribe(StreamKind::ActivationCompletion, None, None, StreamSink::ActivationCompletion)
    }

    /// Reachability changes, starting with the current value.
    pub fn subscribe_reachability(&self) -> PeerResult<Subscription<bool>> {
        self.subscribe(StreamKind::Reachability, None, None, StreamSink::Reachability)
    }

    /// Every inbound message from now on.
    pub fn subscribe_raw_messages(&self) -> PeerResult<Subscription<InboundMessage>> {
        self.subscribe(StreamKind::RawMessage, None, None, StreamSink::RawMessage)
    }

    /// Inbound messages that decode as `T`. Registers `T`'s decoder if it was
    /// not registered yet.
    ///
    /// Fails with `CodecError::HintConflict` when `T::TYPE_HINT` is already
    /// bound to another type.
    pub fn subscribe_typed<T: Messagable>(&self) -> PeerResult<TypedSubscription<T>> {
        let inner: Subscription<TypedMessage> = self.subscribe(
            StreamKind::TypedMessage,
            Some(T::TYPE_HINT),
            Some(CodecBinding::of::<T>()),
            |sink| StreamSink::TypedMessage {
                type_hint: T::TYPE_HINT,
                sink,
            },
        )?;
        Ok(TypedSubscription::new(inner, Arc::clone(&self.diagnostics)))
    }

    /// Live subscribers of `kind`, as seen by the worker.
    pub fn subscriber_count(&self, kind: StreamKind) -> PeerResult<usize> {
        let (reply, rx) = bounded(1);
        self.enqueue(Command::Count { kind, reply })?;
        rx.recv().map_err(|_| PeerError::disconnected(CONTROL_PATH))
    }

    // Outbound.

    /// Sends a message to the counterpart.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SendFailure> {
        self.router.send(&message, |intent| self.route_on_worker(intent))
    }

    pub fn send_typed<T: Messagable>(&self, value: &T, intent: DeliveryIntent) -> Result<(), SendFailure> {
        self.send(OutboundMessage::typed(value.clone(), intent))
    }

    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn route_on_worker(&self, intent: DeliveryIntent) -> Result<DeliveryIntent, SendFailure> {
        let (reply, rx) = bounded(1);
        self.commands
            .send(Command::Route { intent, reply })
            .map_err(|_| SendFailure::Closed)?;
        rx.recv().map_err(|_| SendFailure::Closed)?
    }

    fn subscribe<T>(
        &self,
        kind: StreamKind,
        type_hint: Option<&'static str>,
        binding: Option<CodecBinding>,
        make_sink: impl FnOnce(Sender<T>) -> StreamSink,
    ) -> PeerResult<Subscription<T>> {
        let id = SubscriberId::new();
        let (tx, rx) = unbounded::<T>();
        let (reply, ack) = bounded(1);
        self.enqueue(Command::Subscribe {
            id,
            sink: make_sink(tx),
            binding,
            reply,
        })?;
        ack.recv().map_err(|_| PeerError::disconnected(CONTROL_PATH))??;

        Ok(Subscription::new(id, kind, type_hint, rx, self.commands.clone()))
    }

    fn enqueue(&self, command: Command) -> PeerResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PeerError::disconnected(CONTROL_PATH))
    }

    fn notify(&self, command: Command) {
        if self.enqueue(command).is_err() {
            warn!(component = "connectivity_observer", "observer worker is gone; event dropped");
        }
    }
}

impl fmt::Debug for ConnectivityObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityObserver")
            .field("state", &self.current_state())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectivityObserver {
    fn drop(&mut self) {
        // Subscriptions keep their own command senders, so the worker would
        // never see the queue disconnect; stop it explicitly.
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::session::MockSession;

    fn observer() -> (ConnectivityObserver, Arc<MockSession>) {
        let session = Arc::new(MockSession::new());
        let observer = ConnectivityObserver::new(session.clone()).unwrap();
        (observer, session)
    }

    #[test]
    fn flush_makes_events_visible_to_current_state() {
        let (observer, _) = observer();
        observer.did_change_reachability(true);
        observer.did_change_pairing(true, true);
        observer.flush().unwrap();

        let state = observer.current_state();
        assert!(state.is_reachable);
        assert!(state.is_paired && state.is_installed);
    }

    #[test]
    fn activate_moves_to_activating_and_calls_session() {
        let (observer, session) = observer();
        let states = observer.subscribe_activation_state().unwrap();
        assert_eq!(states.recv().unwrap().activation_state, ActivationState::NotActivated);

        assert_eq!(observer.activate().unwrap(), ActivationRequest::Started);
        assert_eq!(observer.activate().unwrap(), ActivationRequest::AlreadyActivating);
        assert_eq!(session.activation_requests(), 1);
        assert_eq!(states.recv().unwrap().activation_state, ActivationState::Activating);
    }

    #[test]
    fn refused_activation_resolves_completion() {
        let (observer, session) = observer();
        session.set_activate_failure(Some(crate::error::TransportError::NotActivated));
        let completions = observer.subscribe_activation_completion().unwrap();

        let err = observer.activate().unwrap_err();
        assert!(matches!(err, PeerError::Activation(ActivationError::Session { .. })));

        let completion = completions.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(completion, Err(ActivationError::Session { .. })));
        observer.flush().unwrap();
        assert_eq!(observer.current_state().activation_state, ActivationState::NotActivated);
    }

    #[test]
    fn dropped_subscription_is_removed() {
        let (observer, _) = observer();
        let sub = observer.subscribe_reachability().unwrap();
        assert_eq!(observer.subscriber_count(StreamKind::Reachability).unwrap(), 1);
        drop(sub);
        assert_eq!(observer.subscriber_count(StreamKind::Reachability).unwrap(), 0);
    }

    #[test]
    fn dropping_observer_ends_open_streams() {
        let (observer, _) = observer();
        let sub = observer.subscribe_raw_messages().unwrap();
        drop(observer);
        assert!(sub.recv().unwrap_err().is_disconnected());
    }

    #[test]
    fn send_counts_attempts_and_failures() {
        let (observer, _) = observer();
        assert_eq!(
            observer.send(OutboundMessage::raw(crate::Payload::new(), DeliveryIntent::Interactive)),
            Err(SendFailure::NotReachable)
        );
        let metrics = observer.metrics();
        assert_eq!(metrics.sends_attempted, 1);
        assert_eq!(metrics.sends_failed, 1);
    }

    #[test]
    fn builder_refuses_two_types_under_one_hint() {
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        struct Beat {
            bpm: u32,
        }
        impl Messagable for Beat {
            const TYPE_HINT: &'static str = "Beat";
        }

        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
        struct Pulse {
            bpm: u32,
        }
        impl Messagable for Pulse {
            const TYPE_HINT: &'static str = "Beat";
        }

        let err = ConnectivityObserver::builder(Arc::new(MockSession::new()))
            .codec::<Beat>()
            .codec::<Beat>()
            .codec::<Pulse>()
            .build()
            .unwrap_err();
        assert!(matches!(err, PeerError::Codec(CodecError::HintConflict { ref type_hint, .. }) if type_hint == "Beat"));
    }

    #[test]
    fn worker_thread_uses_configured_name() {
        let session = Arc::new(MockSession::new());
        let config = ObserverConfig {
            thread_name: "peerlink-test-worker".to_string(),
            ..ObserverConfig::default()
        };
        let observer = ConnectivityObserver::builder(session).config(config).build().unwrap();
        let name = observer
            .join
            .as_ref()
            .and_then(|handle| handle.thread().name().map(str::to_string));
        assert_eq!(name.as_deref(), Some("peerlink-test-worker"));
    }
}
