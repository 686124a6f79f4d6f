//! Broadcast registry: the subscriber handles of one stream kind.
//!
//! Each handle owns an unbounded channel, so `yield_all` never blocks on a
//! slow consumer. Handles are kept in registration order and there is no
//! history buffer: a value reaches exactly the handles registered before it
//! was yielded.
//!
//! Handles that leave without an explicit `remove` (pruned after their
//! consumer went away, or closed by `close_all`) are parked in a retired set
//! until their one `remove` arrives, which then is a quiet no-op. Removing an
//! id the registry has never seen, or removing it twice, is a programming
//! error. The retired set is therefore bounded by the subscriptions still
//! alive on the consumer side.

use std::collections::HashSet;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::error::RegistryViolation;
use crate::logging::events;

use super::kind::{StreamKind, SubscriberId};

const COMPONENT: &str = "broadcast_registry";

/// Outcome of a successful `remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The handle was live and is now closed.
    Removed,
    /// The handle had already been removed, pruned or closed.
    AlreadyRemoved,
}

#[derive(Debug)]
struct Handle<T> {
    id: SubscriberId,
    sink: Sender<T>,
}

/// Keyed registry of live subscriber handles for one `StreamKind`.
#[derive(Debug)]
pub struct BroadcastRegistry<T> {
    kind: StreamKind,
    handles: Vec<Handle<T>>,
    retired: HashSet<SubscriberId>,
}

impl<T: Clone> BroadcastRegistry<T> {
    #[must_use]
    pub fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            handles: Vec::new(),
            retired: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Creates a fresh handle and returns the consuming end of its sequence.
    pub fn register(&mut self) -> (SubscriberId, Receiver<T>) {
        let id = SubscriberId::new();
        let (sink, rx) = unbounded();
        self.handles.push(Handle { id, sink });
        debug!(
            event = events::SUBSCRIBER_REGISTERED,
            component = COMPONENT,
            kind = %self.kind,
            subscriber = %id,
            live = self.handles.len(),
            "subscriber registered"
        );
        (id, rx)
    }

    /// Registers a handle whose id and sink were created by the caller.
    pub fn insert(&mut self, id: SubscriberId, sink: Sender<T>) -> Result<(), RegistryViolation> {
        if self.retired.contains(&id) || self.contains(id) {
            return Err(RegistryViolation::DuplicateRegistration { kind: self.kind, id });
        }
        self.handles.push(Handle { id, sink });
        debug!(
            event = events::SUBSCRIBER_REGISTERED,
            component = COMPONENT,
            kind = %self.kind,
            subscriber = %id,
            live = self.handles.len(),
            "subscriber registered"
        );
        Ok(())
    }

    /// Pushes `value` to every live handle in registration order.
    ///
    /// Handles whose consumer has gone away are pruned. Returns the number of
    /// handles that accepted the value.
    pub fn yield_all(&mut self, value: &T) -> usize {
        let mut delivered = 0usize;
        let mut pruned = Vec::new();

        self.handles.retain(|handle| {
            if handle.sink.send(value.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                pruned.push(handle.id);
                false
            }
        });

        for id in pruned {
            debug!(
                event = events::SUBSCRIBER_PRUNED,
                component = COMPONENT,
                kind = %self.kind,
                subscriber = %id,
                "consumer disconnected; handle pruned"
            );
            self.retired.insert(id);
        }

        delivered
    }

    /// Detaches and closes the handle.
    pub fn remove(&mut self, id: SubscriberId) -> Result<Removal, RegistryViolation> {
        if let Some(pos) = self.handles.iter().position(|h| h.id == id) {
            // Dropping the sender closes the consumer's sequence.
            self.handles.remove(pos);
            debug!(
                event = events::SUBSCRIBER_REMOVED,
                component = COMPONENT,
                kind = %self.kind,
                subscriber = %id,
                live = self.handles.len(),
                "subscriber removed"
            );
            return Ok(Removal::Removed);
        }

        if self.retired.remove(&id) {
            debug!(
                event = events::SUBSCRIBER_REMOVED_TWICE,
                component = COMPONENT,
                kind = %self.kind,
                subscriber = %id,
                "subscriber already removed"
            );
            return Ok(Removal::AlreadyRemoved);
        }

        Err(RegistryViolation::UnknownSubscriber { kind: self.kind, id })
    }

    /// Detaches and closes every handle. Returns how many were closed.
    pub fn close_all(&mut self) -> usize {
        let closed = self.handles.len();
        for handle in self.handles.drain(..) {
            self.retired.insert(handle.id);
        }
        if closed > 0 {
            debug!(
                event = events::REGISTRY_CLOSED,
                component = COMPONENT,
                kind = %self.kind,
                closed,
                "registry closed"
            );
        }
        closed
    }

    #[must_use]
    pub fn contains(&self, id: SubscriberId) -> bool {
        self.handles.iter().any(|h| h.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Ids that left without a `remove` and are still owed one.
    #[must_use]
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Live ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<SubscriberId> {
        self.handles.iter().map(|h| h.id).collect()
    }
}
