//! Type codec registry.
//!
//! The distributor looks decoders up by type hint, and each hint is bound to
//! one Rust type through its `TypeId`. Decoded values travel
//! through the typed stream as `TypedMessage`, a type-erased value that typed
//! subscriptions downcast back to the concrete `Messagable` type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CodecError;
use crate::payload::{Messagable, Payload};

/// Type-erased decoder for one type hint.
pub type Decoder = Arc<dyn Fn(&Payload) -> Result<TypedMessage, CodecError> + Send + Sync>;

/// A decoded inbound message of some `Messagable` type.
#[derive(Clone)]
pub struct TypedMessage {
    type_hint: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl TypedMessage {
    /// Wraps a decoded value.
    #[must_use]
    pub fn new<T: Messagable>(value: T) -> Self {
        Self {
            type_hint: T::TYPE_HINT,
            value: Arc::new(value),
        }
    }

    #[must_use]
    pub const fn type_hint(&self) -> &'static str {
        self.type_hint
    }

    /// Borrows the value if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Messagable>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Extracts the value as a `T`, cloning only when other holders remain.
    pub fn downcast<T: Messagable>(self) -> Result<T, CodecError> {
        let type_hint = self.type_hint;
        let value = self.value.downcast::<T>().map_err(|_| CodecError::TypeMismatch {
            type_hint: type_hint.to_string(),
        })?;
        Ok(Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
    }
}

impl fmt::Debug for TypedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedMessage")
            .field("type_hint", &self.type_hint)
            .finish_non_exhaustive()
    }
}

/// A type hint together with the one Rust type allowed to use it.
#[derive(Clone)]
pub struct CodecBinding {
    type_hint: &'static str,
    type_id: TypeId,
    type_name: &'static str,
    decoder: Decoder,
}

impl CodecBinding {
    /// Binding that decodes `T::TYPE_HINT` payloads as `T`.
    #[must_use]
    pub fn of<T: Messagable>() -> Self {
        Self {
            type_hint: T::TYPE_HINT,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            decoder: Arc::new(|payload: &Payload| T::from_payload(payload).map(TypedMessage::new)),
        }
    }

    #[must_use]
    pub const fn type_hint(&self) -> &'static str {
        self.type_hint
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for CodecBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecBinding")
            .field("type_hint", &self.type_hint)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Decoders keyed by type hint. Each hint belongs to exactly one Rust type.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    bindings: HashMap<&'static str, CodecBinding>,
}

impl CodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`'s decoder. See [`CodecRegistry::bind`].
    pub fn register<T: Messagable>(&mut self) -> Result<bool, CodecError> {
        self.bind(CodecBinding::of::<T>())
    }

    /// Adds `binding`.
    ///
    /// Returns `Ok(false)` when the hint is already bound to the same type, in
    /// which case the existing decoder is kept. A hint bound to a different
    /// type is a `CodecError::HintConflict` and leaves the registry unchanged.
    pub fn bind(&mut self, binding: CodecBinding) -> Result<bool, CodecError> {
        match self.bindings.get(binding.type_hint) {
            Some(existing) if existing.type_id == binding.type_id => Ok(false),
            Some(existing) => Err(CodecError::HintConflict {
                type_hint: binding.type_hint.to_string(),
                bound: existing.type_name.to_string(),
            }),
            None => {
                self.bindings.insert(binding.type_hint, binding);
                Ok(true)
            }
        }
    }

    #[must_use]
    pub fn contains(&self, type_hint: &str) -> bool {
        self.bindings.contains_key(type_hint)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Decodes `payload` with the decoder for the explicit hint, falling back to
    /// the hint embedded in the payload.
    ///
    /// Returns `None` when there is no hint or no decoder registered for it.
    #[must_use]
    pub fn decode(&self, payload: &Payload, type_hint: Option<&str>) -> Option<Result<TypedMessage, CodecError>> {
        let hint = type_hint.or_else(|| payload.type_hint())?;
        let binding = self.bindings.get(hint)?;
        Some((*binding.decoder)(payload))
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hints: Vec<&&str> = self.bindings.keys().collect();
        hints.sort();
        f.debug_struct("CodecRegistry").field("hints", &hints).finish()
    }
}
