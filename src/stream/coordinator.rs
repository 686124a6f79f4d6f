//! Stream coordinator: one broadcast registry per stream kind.
//!
//! Typed messages get one registry per type hint so a subscriber only sees the
//! type it asked for; together they form the `TypedMessage` population.

use std::collections::HashMap;

use crossbeam_channel::Sender;

use crate::codec::TypedMessage;
use crate::error::RegistryViolation;
use crate::message::InboundMessage;
use crate::state::{ActivationCompletion, ConnectivityState};

use super::kind::{StreamKind, SubscriberId};
use super::registry::{BroadcastRegistry, Removal};

/// The sending end a new subscriber is attached with.
#[derive(Debug)]
pub enum StreamSink {
    ActivationState(Sender<ConnectivityState>),
    ActivationCompletion(Sender<ActivationCompletion>),
    Reachability(Sender<bool>),
    RawMessage(Sender<InboundMessage>),
    TypedMessage {
        type_hint: &'static str,
        sink: Sender<TypedMessage>,
    },
}

impl StreamSink {
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        match self {
            Self::ActivationState(_) => StreamKind::ActivationState,
            Self::ActivationCompletion(_) => StreamKind::ActivationCompletion,
            Self::Reachability(_) => StreamKind::Reachability,
            Self::RawMessage(_) => StreamKind::RawMessage,
            Self::TypedMessage { .. } => StreamKind::TypedMessage,
        }
    }
}

/// Owns every broadcast registry of one observer.
#[derive(Debug)]
pub struct StreamCoordinator {
    activation_state: BroadcastRegistry<ConnectivityState>,
    activation_completion: BroadcastRegistry<ActivationCompletion>,
    reachability: BroadcastRegistry<bool>,
    raw_message: BroadcastRegistry<InboundMessage>,
    typed_message: HashMap<&'static str, BroadcastRegistry<TypedMessage>>,
}

impl Default for StreamCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            activation_state: BroadcastRegistry::new(StreamKind::ActivationState),
            activation_completion: BroadcastRegistry::new(StreamKind::ActivationCompletion),
            reachability: BroadcastRegistry::new(StreamKind::Reachability),
            raw_message: BroadcastRegistry::new(StreamKind::RawMessage),
            typed_message: HashMap::new(),
        }
    }

    /// Attaches a subscriber.
    ///
    /// State-bearing kinds receive `current` on the new handle before any later
    /// publish can reach it.
    pub fn subscribe(
        &mut self,
        id: SubscriberId,
        sink: StreamSink,
        current: &ConnectivityState,
    ) -> Result<(), RegistryViolation> {
        match sink {
            StreamSink::ActivationState(tx) => {
                self.activation_state.insert(id, tx.clone())?;
                let _ = tx.send(*current);
            }
            StreamSink::Reachability(tx) => {
                self.reachability.insert(id, tx.clone())?;
                let _ = tx.send(current.is_reachable);
            }
            StreamSink::ActivationCompletion(tx) => self.activation_completion.insert(id, tx)?,
            StreamSink::RawMessage(tx) => self.raw_message.insert(id, tx)?,
            StreamSink::TypedMessage { type_hint, sink } => self
                .typed_message
                .entry(type_hint)
                .or_insert_with(|| BroadcastRegistry::new(StreamKind::TypedMessage))
                .insert(id, sink)?,
        }
        Ok(())
    }

    /// Detaches a subscriber. `type_hint` selects the typed registry.
    pub fn unsubscribe(
        &mut self,
        kind: StreamKind,
        type_hint: Option<&str>,
        id: SubscriberId,
    ) -> Result<Removal, RegistryViolation> {
        match kind {
            StreamKind::ActivationState => self.activation_state.remove(id),
            StreamKind::ActivationCompletion => self.activation_completion.remove(id),
            StreamKind::Reachability => self.reachability.remove(id),
            StreamKind::RawMessage => self.raw_message.remove(id),
            StreamKind::TypedMessage => type_hint
                .and_then(|hint| self.typed_message.get_mut(hint))
                .map_or(Err(RegistryViolation::UnknownSubscriber { kind, id }), |reg| {
                    reg.remove(id)
                }),
        }
    }

    pub fn publish_state(&mut self, state: ConnectivityState) -> usize {
        self.activation_state.yield_all(&state)
    }

    pub fn publish_completion(&mut self, completion: &ActivationCompletion) -> usize {
        self.activation_completion.yield_all(completion)
    }

    pub fn publish_reachability(&mut self, reachable: bool) -> usize {
        self.reachability.yield_all(&reachable)
    }

    pub fn publish_raw(&mut self, message: &InboundMessage) -> usize {
        self.raw_message.yield_all(message)
    }

    /// Publishes to the subscribers of `message.type_hint()` only.
    pub fn publish_typed(&mut self, message: &TypedMessage) -> usize {
        self.typed_message
            .get_mut(message.type_hint())
            .map_or(0, |reg| reg.yield_all(message))
    }

    /// Live subscriber count; for `TypedMessage` this sums every type.
    #[must_use]
    pub fn subscriber_count(&self, kind: StreamKind) -> usize {
        match kind {
            StreamKind::ActivationState => self.activation_state.len(),
            StreamKind::ActivationCompletion => self.activation_completion.len(),
            StreamKind::Reachability => self.reachability.len(),
            StreamKind::RawMessage => self.raw_message.len(),
            StreamKind::TypedMessage => self.typed_message.values().map(BroadcastRegistry::len).sum(),
        }
    }

    /// Closes every handle of every kind. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        self.activation_state.close_all()
            + self.activation_completion.close_all()
            + self.reachability.close_all()
            + self.raw_message.close_all()
            + self
                .typed_message
                .values_mut()
                .map(BroadcastRegistry::close_all)
                .sum::<usize>()
    }
}
