//! Inbound message fan-out: raw stream first, then the typed stream.

use std::sync::Arc;

use tracing::debug;

use crate::codec::{CodecBinding, CodecRegistry};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsSink, ObserverMetrics};
use crate::error::CodecError;
use crate::logging::events;
use crate::message::InboundMessage;
use crate::stream::StreamCoordinator;

/// How far one inbound message got.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub raw: usize,
    /// `None` when no decoder applied or decoding failed.
    pub typed: Option<usize>,
}

/// Publishes inbound messages to the raw and typed populations.
#[derive(Debug)]
pub struct MessageDistributor {
    codecs: CodecRegistry,
    diagnostics: Arc<dyn DiagnosticsSink>,
    metrics: Arc<ObserverMetrics>,
}

impl MessageDistributor {
    pub fn new(codecs: CodecRegistry, diagnostics: Arc<dyn DiagnosticsSink>, metrics: Arc<ObserverMetrics>) -> Self {
        Self {
            codecs,
            diagnostics,
            metrics,
        }
    }

    /// Adds a binding; a hint already bound to another type is refused.
    pub fn bind(&mut self, binding: CodecBinding) -> Result<bool, CodecError> {
        self.codecs.bind(binding)
    }

    #[must_use]
    pub const fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Delivers `message` to every raw subscriber, then, if a decoder applies
    /// and succeeds, to the subscribers of the decoded type.
    pub fn receive(&self, message: &InboundMessage, coordinator: &mut StreamCoordinator) -> Delivery {
        self.metrics.message_received();
        let raw = coordinator.publish_raw(message);

        let typed = match self.codecs.decode(message.payload(), message.type_hint()) {
            None => None,
            Some(Ok(decoded)) => Some(coordinator.publish_typed(&decoded)),
            Some(Err(err)) => {
                self.metrics.decode_failed();
                self.diagnostics.report(&Diagnostic::new(DiagnosticKind::DecodeFailed {
                    message_id: message.id(),
                    type_hint: message
                        .type_hint()
                        .or_else(|| message.payload().type_hint())
                        .unwrap_or_default()
                        .to_string(),
                    error: err.to_string(),
                }));
                None
            }
        };

        debug!(
            event = events::MESSAGE_RECEIVED,
            component = "message_distributor",
            message_id = %message.id(),
            raw_subscribers = raw,
            typed_subscribers = typed.unwrap_or(0),
        );
        Delivery { raw, typed }
    }
}
