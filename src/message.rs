//! Outbound and inbound message types.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CodecError, ReplyError};
use crate::payload::{Messagable, Payload};

/// How an outbound message should reach the counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryIntent {
    /// Immediate, lowest latency, requires reachability.
    Interactive,
    /// Latest-wins application context; survives disconnection.
    Persisted,
    /// Best-effort queued delivery.
    Queued,
}

impl DeliveryIntent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Persisted => "persisted",
            Self::Queued => "queued",
        }
    }
}

/// Object-safe encoding side of `Messagable`.
pub trait EncodeMessage: Send + Sync {
    fn type_hint(&self) -> &'static str;
    fn encode(&self) -> Result<Payload, CodecError>;
}

impl<T: Messagable> EncodeMessage for T {
    fn type_hint(&self) -> &'static str {
        T::TYPE_HINT
    }

    fn encode(&self) -> Result<Payload, CodecError> {
        self.to_payload()
    }
}

/// Body of an outbound message.
#[derive(Clone)]
pub enum MessageBody {
    Raw(Payload),
    Typed(Arc<dyn EncodeMessage>),
}

impl fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(payload) => f.debug_tuple("Raw").field(payload).finish(),
            Self::Typed(value) => f.debug_tuple("Typed").field(&value.type_hint()).finish(),
        }
    }
}

/// A message a consumer wants delivered to the counterpart.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    body: MessageBody,
    intent: DeliveryIntent,
}

impl OutboundMessage {
    #[must_use]
    pub const fn raw(payload: Payload, intent: DeliveryIntent) -> Self {
        Self {
            body: MessageBody::Raw(payload),
            intent,
        }
    }

    #[must_use]
    pub fn typed<T: Messagable>(value: T, intent: DeliveryIntent) -> Self {
        Self {
            body: MessageBody::Typed(Arc::new(value)),
            intent,
        }
    }

    #[must_use]
    pub const fn intent(&self) -> DeliveryIntent {
        self.intent
    }

    #[must_use]
    pub const fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Produces the raw payload handed to the transport.
    pub fn encode(&self) -> Result<Payload, CodecError> {
        match &self.body {
            MessageBody::Raw(payload) => Ok(payload.clone()),
            MessageBody::Typed(value) => value.encode(),
        }
    }
}

type ReplyFn = Box<dyn FnOnce(Payload) + Send>;

/// One-shot reply capability shared by every clone of an inbound message.
#[derive(Clone)]
pub struct ReplyHandle {
    slot: Arc<Mutex<Option<ReplyFn>>>,
}

impl ReplyHandle {
    pub fn new(reply: impl FnOnce(Payload) + Send + 'static) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(reply)))),
        }
    }

    /// Sends the reply. Only the first call across all clones succeeds.
    pub fn send(&self, payload: Payload) -> Result<(), ReplyError> {
        let reply = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ReplyError::AlreadyReplied)?;
        reply(payload);
        Ok(())
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// A message received from the counterpart.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    id: Uuid,
    payload: Payload,
    type_hint: Option<String>,
    received_at: DateTime<Utc>,
    reply: Option<ReplyHandle>,
}

impl InboundMessage {
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            type_hint: None,
            received_at: Utc::now(),
            reply: None,
        }
    }

    /// Names the type the sender encoded, overriding any embedded hint.
    #[must_use]
    pub fn with_type_hint(mut self, type_hint: impl Into<String>) -> Self {
        self.type_hint = Some(type_hint.into());
        self
    }

    /// Attaches the sender's reply handler.
    #[must_use]
    pub fn with_reply(mut self, reply: impl FnOnce(Payload) + Send + 'static) -> Self {
        self.reply = Some(ReplyHandle::new(reply));
        self
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn type_hint(&self) -> Option<&str> {
        self.type_hint.as_deref()
    }

    #[must_use]
    pub const fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns true while a reply can still be sent.
    #[must_use]
    pub fn expects_reply(&self) -> bool {
        self.reply.as_ref().is_some_and(ReplyHandle::is_pending)
    }

    /// Answers the sender.
    pub fn reply(&self, payload: Payload) -> Result<(), ReplyError> {
        self.reply
            .as_ref()
            .ok_or(ReplyError::NoReplyExpected)?
            .send(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ack {
        ok: bool,
    }

    impl Messagable for Ack {
        const TYPE_HINT: &'static str = "Ack";
    }

    #[test]
    fn typed_outbound_encodes_with_tag() {
        let msg = OutboundMessage::typed(Ack { ok: true }, DeliveryIntent::Queued);
        let payload = msg.encode().unwrap();
        assert_eq!(payload.type_hint(), Some("Ack"));
        assert_eq!(payload.get("ok"), Some(&json!(true)));
        assert_eq!(format!("{:?}", msg.body()), "Typed(\"Ack\")");
    }

    #[test]
    fn reply_is_one_shot_across_clones() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let msg = InboundMessage::new(Payload::new()).with_reply(move |p| {
            let _ = tx.send(p);
        });
        let copy = msg.clone();
        assert!(copy.expects_reply());

        let answer = Payload::from_json(json!({"ok": true})).unwrap();
        msg.reply(answer.clone()).unwrap();
        assert_eq!(copy.reply(Payload::new()), Err(ReplyError::AlreadyReplied));
        assert!(!msg.expects_reply());
        assert_eq!(rx.try_recv().unwrap(), answer);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reply_without_handler_is_an_error() {
        let msg = InboundMessage::new(Payload::new());
        assert!(!msg.expects_reply());
        assert_eq!(msg.reply(Payload::new()), Err(ReplyError::NoReplyExpected));
    }

    #[test]
    fn explicit_type_hint_is_kept() {
        let msg = InboundMessage::new(Payload::new()).with_type_hint("Ack");
        assert_eq!(msg.type_hint(), Some("Ack"));
    }
}
