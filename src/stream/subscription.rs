//! Consumer side of a stream.
//!
//! A `Subscription` owns the receiving end of one handle's queue plus a
//! command sender back to the observer worker, which is how dropping it
//! unregisters the handle. `TypedSubscription` layers the downcast to a
//! concrete `Messagable` type on top.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::codec::TypedMessage;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink};
use crate::error::{PeerError, PeerResult};
use crate::observer::worker::Command;
use crate::payload::Messagable;

use super::kind::{StreamKind, SubscriberId};

/// A live sequence of values for one subscriber.
///
/// Dropping the subscription unregisters its handle. Once the handle is
/// removed (or the observer is torn down) buffered values can still be read,
/// after which receiving reports `PeerError::Disconnected`.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriberId,
    kind: StreamKind,
    type_hint: Option<&'static str>,
    rx: Receiver<T>,
    control_tx: Sender<Command>,
    unregistered: AtomicBool,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriberId,
        kind: StreamKind,
        type_hint: Option<&'static str>,
        rx: Receiver<T>,
        control_tx: Sender<Command>,
    ) -> Self {
        Self {
            id,
            kind,
            type_hint,
            rx,
            control_tx,
            unregistered: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Explicit unregistration.
    ///
    /// Non-blocking and idempotent. The sequence ends once the observer has
    /// processed the removal.
    pub fn unsubscribe(&self) {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = self.control_tx.send(Command::Unsubscribe {
            kind: self.kind,
            type_hint: self.type_hint,
            id: self.id,
        });
    }

    /// Receive the next value (blocking).
    pub fn recv(&self) -> PeerResult<T> {
        self.rx.recv().map_err(|_| self.disconnected())
    }

    /// Receive the next value with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> PeerResult<T> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => PeerError::Timeout {
                duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
            },
            RecvTimeoutError::Disconnected => self.disconnected(),
        })
    }

    /// Receive a value if one is buffered.
    pub fn try_recv(&self) -> PeerResult<Option<T>> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Takes every value buffered right now without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// Number of values waiting to be read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    fn disconnected(&self) -> PeerError {
        PeerError::disconnected(format!("{}_stream", self.kind))
    }
}

impl<T> Iterator for Subscription<T> {
    type Item = T;

    /// Blocks for the next value; ends when the sequence is closed.
    fn next(&mut self) -> Option<T> {
        self.rx.recv().ok()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        // Never blocks: the command queue is unbounded, and a stopped worker
        // simply leaves the message unread.
        self.unsubscribe();
    }
}

/// A subscription to inbound messages decoded as `T`.
///
/// A value of any other Rust type is skipped and reported as a
/// `DiagnosticKind::TypeMismatch`; the stream keeps going.
#[derive(Debug)]
pub struct TypedSubscription<T> {
    inner: Subscription<TypedMessage>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Messagable> TypedSubscription<T> {
    pub(crate) fn new(inner: Subscription<TypedMessage>, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            inner,
            diagnostics,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.inner.id()
    }

    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
    }

    pub fn recv(&self) -> PeerResult<T> {
        loop {
            if let Some(value) = self.accept(self.inner.recv()?) {
                return Ok(value);
            }
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> PeerResult<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.inner.recv_timeout(remaining).map_err(|err| match err {
                PeerError::Timeout { .. } => PeerError::Timeout {
                    duration_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
                },
                other => other,
            })?;
            if let Some(value) = self.accept(message) {
                return Ok(value);
            }
        }
    }

    pub fn try_recv(&self) -> PeerResult<Option<T>> {
        while let Some(message) = self.inner.try_recv()? {
            if let Some(value) = self.accept(message) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn accept(&self, message: TypedMessage) -> Option<T> {
        let type_hint = message.type_hint();
        match message.downcast::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.diagnostics.report(&Diagnostic::new(DiagnosticKind::TypeMismatch {
                    type_hint: type_hint.to_string(),
                    expected: std::any::type_name::<T>().to_string(),
                }));
                None
            }
        }
    }
}

impl<T: Messagable> Iterator for TypedSubscription<T> {
    type Item = T;

    /// Blocks for the next `T`; ends only when the sequence is closed.
    fn next(&mut self) -> Option<T> {
        self.recv().ok()
    }
}
