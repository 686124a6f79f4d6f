//! Observer worker thread.
//!
//! Owns the state manager, the distributor and every broadcast registry.
//! Commands are drained from one FIFO queue, which is what serializes state
//! mutations, registrations and routing decisions against each other.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{info, warn};

use crate::codec::CodecBinding;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, ObserverMetrics};
use crate::error::{ActivationError, PeerError, PeerResult, RegistryViolation, SendFailure};
use crate::logging::events;
use crate::message::{DeliveryIntent, InboundMessage};
use crate::routing::{MessageDistributor, MessageRouter};
use crate::state::ActivationState;
use crate::stream::{Removal, StreamCoordinator, StreamKind, StreamSink, SubscriberId};

use super::manager::{ActivationRequest, ConnectivityStateManager};

pub(crate) enum Command {
    Activation(Result<ActivationState, ActivationError>),
    BeginActivation {
        reply: Sender<Result<ActivationRequest, ActivationError>>,
    },
    Reachability(bool),
    Pairing {
        paired: bool,
        installed: bool,
    },
    Message(InboundMessage),
    Subscribe {
        id: SubscriberId,
        sink: StreamSink,
        binding: Option<CodecBinding>,
        reply: Sender<PeerResult<()>>,
    },
    Unsubscribe {
        kind: StreamKind,
        type_hint: Option<&'static str>,
        id: SubscriberId,
    },
    Route {
        intent: DeliveryIntent,
        reply: Sender<Result<DeliveryIntent, SendFailure>>,
    },
    Count {
        kind: StreamKind,
        reply: Sender<usize>,
    },
    Barrier {
        reply: Sender<()>,
    },
    Shutdown,
}

pub(crate) struct Worker {
    pub(crate) manager: ConnectivityStateManager,
    pub(crate) distributor: MessageDistributor,
    pub(crate) coordinator: StreamCoordinator,
    pub(crate) router: Arc<MessageRouter>,
    pub(crate) diagnostics: Arc<dyn DiagnosticsSink>,
    pub(crate) metrics: Arc<ObserverMetrics>,
}

impl Worker {
    pub(crate) fn run(mut self, commands: Receiver<Command>) {
        info!(event = events::WORKER_START, component = "observer_worker");

        // Ends on `Shutdown`, or once every sender (observer and subscriptions)
        // is gone.
        while let Ok(command) = commands.recv() {
            if !self.handle(command) {
                break;
            }
        }

        let closed = self.coordinator.close_all();
        info!(event = events::WORKER_STOP, component = "observer_worker", closed);
    }

    /// Returns false when the worker should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Activation(result) => {
                self.manager.apply_activation(result, &mut self.coordinator);
            }
            Command::BeginActivation { reply } => {
                let _ = reply.send(self.manager.begin_activation(&mut self.coordinator));
            }
            Command::Reachability(reachable) => {
                self.manager.apply_reachability(reachable, &mut self.coordinator);
            }
            Command::Pairing { paired, installed } => {
                self.manager.apply_pairing(paired, installed, &mut self.coordinator);
            }
            Command::Message(message) => {
                self.distributor.receive(&message, &mut self.coordinator);
            }
            Command::Subscribe {
                id,
                sink,
                binding,
                reply,
            } => {
                let _ = reply.send(self.subscribe(id, sink, binding));
            }
            Command::Unsubscribe { kind, type_hint, id } => {
                match self.coordinator.unsubscribe(kind, type_hint, id) {
                    Ok(Removal::Removed | Removal::AlreadyRemoved) => {}
                    Err(violation) => self.programming_error(&violation),
                }
            }
            Command::Route { intent, reply } => {
                let current = self.manager.current_state();
                let _ = reply.send(self.router.route(intent, &current));
            }
            Command::Count { kind, reply } => {
                let _ = reply.send(self.coordinator.subscriber_count(kind));
            }
            Command::Barrier { reply } => {
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn subscribe(&mut self, id: SubscriberId, sink: StreamSink, binding: Option<CodecBinding>) -> PeerResult<()> {
        if let Some(binding) = binding {
            let type_name = binding.type_name();
            if let Err(err) = self.distributor.bind(binding) {
                warn!(
                    event = events::CODEC_HINT_CONFLICT,
                    component = "observer_worker",
                    subscriber = %id,
                    requested = type_name,
                    err = %err,
                    "typed subscription refused"
                );
                return Err(err.into());
            }
        }

        let current = self.manager.current_state();
        self.coordinator.subscribe(id, sink, &current).map_err(|violation| {
            self.programming_error(&violation);
            // The violation has been reported; callers only see an internal error.
            PeerError::internal(violation.to_string())
        })
    }

    fn programming_error(&self, violation: &RegistryViolation) {
        self.metrics.programming_error();
        self.diagnostics.report(&Diagnostic::new(DiagnosticKind::ProgrammingError {
            error: violation.to_string(),
        }));
        if cfg!(debug_assertions) {
            panic!("stream registry misuse: {violation}");
        }
    }
}
