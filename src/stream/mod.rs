//! Multi-subscriber stream fan-out.
//!
//! A `BroadcastRegistry` holds the subscriber handles of one stream kind; the
//! `StreamCoordinator` owns one registry per kind. Both are single-owner
//! structures: the observer worker is the only code that touches them, which
//! is what makes registration, delivery and removal race-free without locks.

/// Per-kind subscriber registry.
pub mod registry;
/// Registry-per-kind coordinator.
pub mod coordinator;
/// Stream kinds and subscriber ids.
pub mod kind;
/// Consumer-side stream handles.
pub mod subscription;

pub use coordinator::{StreamCoordinator, StreamSink};
pub use kind::{StreamKind, SubscriberId};
pub use registry::{BroadcastRegistry, Removal};
pub use subscription::{Subscription, TypedSubscription};
