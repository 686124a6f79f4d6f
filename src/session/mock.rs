//! In-memory session for tests and embedding examples.
//!
//! Records every call and can be scripted to fail or to hold sends until the
//! test releases them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::TransportError;
use crate::message::DeliveryIntent;
use crate::payload::Payload;

use super::ConnectivitySession;

/// One payload accepted by the mock.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct SentPayload {
    pub payload: Payload,
    pub intent: DeliveryIntent,
}

/// Scriptable `ConnectivitySession`.
#[derive(Debug, Default)]
pub struct MockSession {
    sent: Mutex<Vec<SentPayload>>,
    activations: AtomicUsize,
    send_failure: Mutex<Option<TransportError>>,
    activate_failure: Mutex<Option<TransportError>>,
    gate: Option<Receiver<()>>,
}

impl MockSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session whose `send` blocks until the returned sender releases it,
    /// one message per send.
    #[must_use]
    pub fn gated() -> (Self, Sender<()>) {
        let (release, gate) = unbounded();
        let session = Self {
            gate: Some(gate),
            ..Self::default()
        };
        (session, release)
    }

    /// Makes every subsequent `send` fail with `err` (`None` restores success).
    pub fn set_send_failure(&self, err: Option<TransportError>) {
        *self.send_failure.lock().unwrap_or_else(PoisonError::into_inner) = err;
    }

    /// Makes every subsequent `activate` fail with `err`.
    pub fn set_activate_failure(&self, err: Option<TransportError>) {
        *self.activate_failure.lock().unwrap_or_else(PoisonError::into_inner) = err;
    }

    /// Payloads accepted so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentPayload> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of `activate` calls, including failed ones.
    #[must_use]
    pub fn activation_requests(&self) -> usize {
        self.activations.load(Ordering::Acquire)
    }
}

impl ConnectivitySession for MockSession {
    fn activate(&self) -> Result<(), TransportError> {
        self.activations.fetch_add(1, Ordering::AcqRel);
        match self.activate_failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn send(&self, payload: &Payload, intent: DeliveryIntent) -> Result<(), TransportError> {
        if let Some(gate) = &self.gate {
            gate.recv().map_err(|_| TransportError::Session {
                message: "mock gate closed".to_string(),
            })?;
        }

        if let Some(err) = self.send_failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(err);
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentPayload {
                payload: payload.clone(),
                intent,
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_sends_in_order() {
        let session = MockSession::new();
        let a = Payload::from_json(json!({"n": 1})).unwrap();
        let b = Payload::from_json(json!({"n": 2})).unwrap();
        session.send(&a, DeliveryIntent::Interactive).unwrap();
        session.send(&b, DeliveryIntent::Persisted).unwrap();

        let sent = session.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].payload, a);
        assert_eq!(sent[1].intent, DeliveryIntent::Persisted);
    }

    #[test]
    fn scripted_failure_is_returned_and_not_recorded() {
        let session = MockSession::new();
        session.set_send_failure(Some(TransportError::Unavailable {
            message: "out of range".to_string(),
        }));
        let err = session.send(&Payload::new(), DeliveryIntent::Interactive).unwrap_err();
        assert!(matches!(err, TransportError::Unavailable { .. }));
        assert!(session.sent().is_empty());

        session.set_send_failure(None);
        session.send(&Payload::new(), DeliveryIntent::Interactive).unwrap();
        assert_eq!(session.sent().len(), 1);
    }

    #[test]
    fn activation_calls_are_counted() {
        let session = MockSession::new();
        session.activate().unwrap();
        session.set_activate_failure(Some(TransportError::NotActivated));
        assert!(session.activate().is_err());
        assert_eq!(session.activation_requests(), 2);
    }

    #[test]
    fn gated_send_waits_for_release() {
        let (session, release) = MockSession::gated();
        let session = std::sync::Arc::new(session);
        let worker = {
            let session = std::sync::Arc::clone(&session);
            std::thread::spawn(move || session.send(&Payload::new(), DeliveryIntent::Queued))
        };

        std::thread::sleep(std::time::Duration::from_millis(30));
        assert!(session.sent().is_empty());

        release.send(()).unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(session.sent().len(), 1);
    }
}
