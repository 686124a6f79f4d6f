//! Connectivity session contract.
//!
//! The session is the external primitive that talks to the counterpart. The
//! observer never assumes anything about how a payload physically travels:
//! it only calls `activate` and `send` and reacts to the callbacks the
//! session delivers through the observer's `did_*` entry points.

pub mod mock;

use crate::error::TransportError;
use crate::message::DeliveryIntent;
use crate::payload::Payload;

pub use mock::{MockSession, SentPayload};

/// Outbound half of a connectivity session.
///
/// # Contract
/// - `activate` only starts the handshake; its outcome arrives later through
///   `ConnectivityObserver::did_activate`.
/// - `send` is invoked with the path chosen by the routing policy and returns
///   once the session accepted or refused the payload. It is never retried by
///   the caller.
/// - Both may be called from any thread, concurrently.
pub trait ConnectivitySession: Send + Sync {
    /// Begins activation.
    fn activate(&self) -> Result<(), TransportError>;

    /// Hands `payload` to the session on the given delivery path.
    fn send(&self, payload: &Payload, intent: DeliveryIntent) -> Result<(), TransportError>;
}
