#![forbid(unsafe_code)]

//! Text form: the envelope as a JSON object, and serde integration.
//!
//! `Watchable<T>` (for any [`WireType`] `T`) and `Watchable<DynValue>`
//! implement `Serialize`/`Deserialize`, so a cell nested inside any serde
//! structure is written as `{"type": ..., "value": ...}` without per-field
//! wiring. The serde impls use the process-wide registry and the JSON value
//! format; [`TextCodec`] exposes the same conversion with an explicit
//! registry.
//!
//! Listeners are never serialized; a deserialized cell starts without any.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::envelope::{Envelope, EnvelopeCodec};
use super::format::{JsonValueFormat, ValueFormat};
use super::registry::TypeRegistry;
use super::wire_type::{DynValue, WireType};
use crate::cell::Watchable;
use crate::error::{Result, WatchError};

/// JSON text codec for cells.
#[derive(Debug)]
pub struct TextCodec<'r, F: ValueFormat = JsonValueFormat> {
    envelopes: EnvelopeCodec<'r, F>,
}

impl Default for TextCodec<'static, JsonValueFormat> {
    fn default() -> Self {
        Self::new()
    }
}

impl TextCodec<'static, JsonValueFormat> {
    /// Codec over the process-wide registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            envelopes: EnvelopeCodec::new(),
        }
    }
}

impl<'r, F: ValueFormat> TextCodec<'r, F> {
    /// Codec over an explicit format and registry.
    #[must_use]
    pub fn with_registry(format: F, registry: &'r TypeRegistry<F>) -> Self {
        Self {
            envelopes: EnvelopeCodec::with_registry(format, registry),
        }
    }

    /// Envelope for a typed cell.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeCodec::encode`].
    pub fn encode<T: WireType>(&self, cell: &Watchable<T>) -> Result<Envelope> {
        self.envelopes.encode(cell)
    }

    /// Envelope for an erased cell.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeCodec::encode_dyn`].
    pub fn encode_dyn(&self, cell: &Watchable<DynValue>) -> Result<Envelope> {
        self.envelopes.encode_dyn(cell)
    }

    /// Typed cell from an envelope.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeCodec::decode`].
    pub fn decode<T: WireType>(&self, envelope: &Envelope) -> Result<Watchable<T>> {
        self.envelopes.decode(envelope)
    }

    /// Erased cell from an envelope.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeCodec::decode_dyn`].
    pub fn decode_dyn(&self, envelope: &Envelope) -> Result<Watchable<DynValue>> {
        self.envelopes.decode_dyn(envelope)
    }

    /// Serialize a typed cell to a JSON document.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeCodec::encode`].
    pub fn to_json<T: WireType>(&self, cell: &Watchable<T>) -> Result<String> {
        envelope_to_json(&self.encode(cell)?)
    }

    /// Serialize an erased cell to a JSON document.
    ///
    /// # Errors
    ///
    /// See [`EnvelopeCodec::encode_dyn`].
    pub fn to_json_dyn(&self, cell: &Watchable<DynValue>) -> Result<String> {
        envelope_to_json(&self.encode_dyn(cell)?)
    }

    /// Parse a JSON document into a typed cell.
    ///
    /// # Errors
    ///
    /// [`WatchError::Serialization`] when the document is not an envelope,
    /// otherwise see [`EnvelopeCodec::decode`].
    pub fn from_json<T: WireType>(&self, json: &str) -> Result<Watchable<T>> {
        self.decode(&envelope_from_json(json)?)
    }

    /// Parse a JSON document into an erased cell.
    ///
    /// # Errors
    ///
    /// [`WatchError::Serialization`] when the document is not an envelope,
    /// otherwise see [`EnvelopeCodec::decode_dyn`].
    pub fn from_json_dyn(&self, json: &str) -> Result<Watchable<DynValue>> {
        self.decode_dyn(&envelope_from_json(json)?)
    }
}

fn envelope_to_json(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|err| WatchError::serialization("Envelope", err))
}

fn envelope_from_json(json: &str) -> Result<Envelope> {
    serde_json::from_str(json).map_err(|err| WatchError::serialization("Envelope", err))
}

impl<T: WireType> Serialize for Watchable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        EnvelopeCodec::new()
            .encode(self)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de, T: WireType> Deserialize<'de> for Watchable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        EnvelopeCodec::new()
            .decode(&envelope)
            .map_err(D::Error::custom)
    }
}

impl Serialize for Watchable<DynValue> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        EnvelopeCodec::new()
            .encode_dyn(self)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Watchable<DynValue> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let envelope = Envelope::deserialize(deserializer)?;
        EnvelopeCodec::new()
            .decode_dyn(&envelope)
            .map_err(D::Error::custom)
    }
}
