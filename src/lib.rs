//! # peerlink - Connectivity Observation Layer
//!
//! peerlink sits between a paired-device connectivity session and the code
//! that cares about it. It keeps one canonical connectivity snapshot, fans
//! session events out to any number of independent subscribers, and routes
//! outbound messages over the delivery path the current state allows.
//!
//! ## Core Concepts
//!
//! - **ConnectivityState**: activation, reachability, pairing and install flags
//! - **Stream kinds**: activation state, activation completion, reachability,
//!   raw messages and typed messages, each with its own subscriber population
//! - **Subscription**: a live sequence for one subscriber; dropping it
//!   unregisters the subscriber
//! - **Delivery intent**: interactive, persisted or queued
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use peerlink::session::MockSession;
//! use peerlink::{ActivationState, ConnectivityObserver, DeliveryIntent, OutboundMessage, Payload};
//!
//! let session = Arc::new(MockSession::new());
//! let observer = ConnectivityObserver::new(session.clone()).unwrap();
//! let reachability = observer.subscribe_reachability().unwrap();
//!
//! observer.did_activate(Ok(ActivationState::Activated));
//! observer.did_change_reachability(true);
//!
//! assert_eq!(reachability.recv().unwrap(), false);
//! assert_eq!(reachability.recv().unwrap(), true);
//!
//! let mut payload = Payload::new();
//! payload.insert("k", "v").unwrap();
//! observer
//!     .send(OutboundMessage::raw(payload, DeliveryIntent::Interactive))
//!     .unwrap();
//! assert_eq!(session.sent().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Values and errors
pub mod codec;
pub mod error;
pub mod message;
pub mod payload;
pub mod state;

// Ambient
pub mod diagnostics;
pub mod logging;

// Fan-out, routing and the observer
pub mod observer;
pub mod routing;
pub mod session;
pub mod stream;

// Re-export primary types at crate root for convenience
pub use codec::{CodecBinding, CodecRegistry, TypedMessage};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, MemoryDiagnostics, MetricsSnapshot, TracingDiagnostics};
pub use error::{
    ActivationError, CodecError, PeerError, PeerResult, RegistryViolation, ReplyError, SendFailure, TransportError,
};
pub use message::{DeliveryIntent, InboundMessage, OutboundMessage, ReplyHandle};
pub use observer::{ActivationRequest, ConnectivityObserver, ObserverBuilder, ObserverConfig, PublishPolicy};
pub use payload::{Messagable, Payload, TYPE_HINT_KEY};
pub use routing::{DefaultPolicy, RoutingPolicy};
pub use session::ConnectivitySession;
pub use state::{ActivationCompletion, ActivationState, ConnectivityState};
pub use stream::{StreamKind, SubscriberId, Subscription, TypedSubscription};
