#![forbid(unsafe_code)]

//! The `{type, value}` envelope and the cell ↔ envelope conversion shared by
//! both wire formats.
//!
//! # Empty cells
//!
//! A cell without a value encodes to the reserved marker
//! `{type: "none", value: ""}` and the marker decodes to an empty cell. The
//! marker name can never be registered as a value type.
//!
//! # Typed vs. erased decoding
//!
//! [`EnvelopeCodec::decode`] knows the element type statically: an envelope
//! naming exactly `T::wire_name()` parses directly. Any other name is looked
//! up in the registry to tell an unknown type
//! ([`WatchError::TypeResolution`]) from a known but different one
//! ([`WatchError::TypeMismatch`]). [`EnvelopeCodec::decode_dyn`] always goes
//! through the registry and yields a `Watchable<DynValue>`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::format::{JsonValueFormat, ValueFormat};
use super::registry::{TypeRegistry, registry};
use super::wire_type::{DynValue, WireType};
use crate::cell::Watchable;
use crate::error::{Result, WatchError};

/// Reserved type name marking an empty cell.
pub const NONE_TYPE_NAME: &str = "none";

/// Field name carrying the type name.
pub const TYPE_FIELD: &str = "type";

/// Field name carrying the rendered value.
pub const VALUE_FIELD: &str = "value";

/// Wire record for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Fully-qualified wire name of the value's type.
    #[serde(rename = "type")]
    pub type_name: String,
    /// The value rendered by the value format.
    pub value: String,
}

impl Envelope {
    /// Build an envelope from its two fields.
    #[must_use]
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }

    /// The empty-cell marker.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(NONE_TYPE_NAME, String::new())
    }

    /// Whether this is the empty-cell marker.
    #[must_use]
    pub fn is_empty_marker(&self) -> bool {
        self.type_name == NONE_TYPE_NAME
    }
}

/// Converts cells to envelopes and back through a registry and value format.
///
/// Stateless apart from the borrowed registry; every call is independent.
#[derive(Debug)]
pub struct EnvelopeCodec<'r, F: ValueFormat = JsonValueFormat> {
    format: F,
    registry: &'r TypeRegistry<F>,
}

impl<'r, F: ValueFormat + Clone> Clone for EnvelopeCodec<'r, F> {
    fn clone(&self) -> Self {
        Self {
            format: self.format.clone(),
            registry: self.registry,
        }
    }
}

impl Default for EnvelopeCodec<'static, JsonValueFormat> {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeCodec<'static, JsonValueFormat> {
    /// Codec over the process-wide registry and the JSON value format.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(JsonValueFormat, registry())
    }
}

impl<'r, F: ValueFormat> EnvelopeCodec<'r, F> {
    /// Codec over an explicit format and registry.
    #[must_use]
    pub fn with_registry(format: F, registry: &'r TypeRegistry<F>) -> Self {
        Self { format, registry }
    }

    /// The value format in use.
    #[must_use]
    pub fn format(&self) -> &F {
        &self.format
    }

    /// The registry used for name resolution.
    #[must_use]
    pub fn registry(&self) -> &'r TypeRegistry<F> {
        self.registry
    }

    /// Envelope for the current value of a typed cell.
    ///
    /// # Errors
    ///
    /// [`WatchError::Serialization`] when the value cannot be rendered.
    pub fn encode<T: WireType>(&self, cell: &Watchable<T>) -> Result<Envelope> {
        cell.with(|value| match value {
            None => Ok(Envelope::empty()),
            Some(value) => {
                let type_name = T::wire_name();
                let text = self
                    .format
                    .render(value)
                    .map_err(|err| WatchError::serialization(type_name.as_ref(), err))?;
                Ok(Envelope::new(type_name, text))
            }
        })
    }

    /// Envelope for the current value of an erased cell.
    ///
    /// # Errors
    ///
    /// [`WatchError::TypeResolution`] when the value's type is not
    /// registered, [`WatchError::Serialization`] when rendering fails.
    pub fn encode_dyn(&self, cell: &Watchable<DynValue>) -> Result<Envelope> {
        let Some(value) = cell.get() else {
            return Ok(Envelope::empty());
        };
        let descriptor = self
            .registry
            .descriptor_for(value.value_type_id())
            .ok_or_else(|| WatchError::TypeResolution {
                type_name: value.wire_name().into_owned(),
            })?;
        let text = descriptor.render(&self.format, &value)?;
        Ok(Envelope::new(descriptor.name(), text))
    }

    /// Rebuild a typed cell from an envelope. The new cell has no listeners.
    ///
    /// # Errors
    ///
    /// [`WatchError::TypeResolution`], [`WatchError::TypeMismatch`], or
    /// [`WatchError::Serialization`].
    pub fn decode<T: WireType>(&self, envelope: &Envelope) -> Result<Watchable<T>> {
        if envelope.is_empty_marker() {
            return Ok(Watchable::empty());
        }
        let expected = T::wire_name();
        if envelope.type_name != expected {
            let err = match self.registry.resolve(&envelope.type_name) {
                Ok(_) => WatchError::TypeMismatch {
                    expected: expected.into_owned(),
                    found: envelope.type_name.clone(),
                },
                Err(err) => err,
            };
            warn!(type_name = %envelope.type_name, %err, "envelope type rejected");
            return Err(err);
        }
        let value = self
            .format
            .parse::<T>(&envelope.value)
            .map_err(|err| WatchError::serialization(expected.as_ref(), err))?;
        Ok(Watchable::new(value))
    }

    /// Rebuild an erased cell from an envelope, resolving the type by name.
    ///
    /// # Errors
    ///
    /// [`WatchError::TypeResolution`] or [`WatchError::Serialization`].
    pub fn decode_dyn(&self, envelope: &Envelope) -> Result<Watchable<DynValue>> {
        if envelope.is_empty_marker() {
            return Ok(Watchable::empty());
        }
        let descriptor = self.registry.resolve(&envelope.type_name).inspect_err(|err| {
            warn!(type_name = %envelope.type_name, %err, "envelope type rejected");
        })?;
        let value = descriptor.parse(&self.format, &envelope.value)?;
        Ok(Watchable::new(value))
    }
}
