#![forbid(unsafe_code)]

//! Binary form: the envelope as one framed document.
//!
//! Encoding writes `start`, field `type`, field `value`, `end`, in that
//! order. Decoding reads the same sequence back.
//!
//! # Invariants
//!
//! 1. Each `encode`/`decode` call handles exactly one envelope.
//! 2. On success the reader cursor sits just past the envelope's end marker.
//! 3. If the frame opened but its fields are bad, or the envelope does not
//!    resolve, the reader still ends just past the end marker, so the next
//!    envelope in the stream stays readable. If the frame never opened the
//!    cursor does not move.
//! 4. A failed encode leaves no partial document in the writer.
//!
//! # Failure Modes
//!
//! | Failure | Cursor after | Error |
//! |---------|--------------|-------|
//! | Stream truncated before a frame | unchanged | `Document` |
//! | Wrong or missing field | past frame | `Document` |
//! | Unknown type name | past frame | `TypeResolution` |
//! | Value text does not parse | past frame | `Serialization` |

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::document::{DocumentReader, DocumentWriter};
use super::envelope::{Envelope, EnvelopeCodec, TYPE_FIELD, VALUE_FIELD};
use super::format::{JsonValueFormat, ValueFormat};
use super::registry::TypeRegistry;
use super::wire_type::{DynValue, WireType};
use crate::cell::Watchable;
use crate::error::{Result, WatchError};

/// A codec for one cell type over a framed document stream.
pub trait CellCodec: Send + Sync {
    /// Element type of the cells this codec handles.
    type Value: Clone + Send + Sync + 'static;

    /// Name of the cell type handled, e.g. `Watchable<i32>`.
    fn handled_type(&self) -> String;

    /// Write `cell` as one document.
    ///
    /// # Errors
    ///
    /// Rendering or framing errors; the writer is left without a partial
    /// document.
    fn encode(&self, writer: &mut dyn DocumentWriter, cell: &Watchable<Self::Value>) -> Result<()>;

    /// Read one document into a new cell without listeners.
    ///
    /// # Errors
    ///
    /// Framing or resolution errors; see the module docs for the cursor
    /// position afterwards.
    fn decode(&self, reader: &mut dyn DocumentReader) -> Result<Watchable<Self::Value>>;
}

/// Shared handle to a codec for cells of `T`.
pub type SharedCellCodec<T> = Arc<dyn CellCodec<Value = T>>;

/// Write `envelope` as one document.
///
/// # Errors
///
/// [`WatchError::Document`] when the writer rejects the frame; the partial
/// document is discarded.
pub fn write_envelope(writer: &mut dyn DocumentWriter, envelope: &Envelope) -> Result<()> {
    writer.write_start_document()?;
    let written = writer
        .write_string(TYPE_FIELD, &envelope.type_name)
        .and_then(|()| writer.write_string(VALUE_FIELD, &envelope.value))
        .and_then(|()| writer.write_end_document());
    if let Err(err) = written {
        writer.abandon_document();
        return Err(err.into());
    }
    Ok(())
}

/// Read one document as an envelope.
///
/// # Errors
///
/// [`WatchError::Document`] when the frame is malformed. If the frame was
/// opened, the reader is moved past its end before returning.
pub fn read_envelope(reader: &mut dyn DocumentReader) -> Result<Envelope> {
    reader.read_start_document()?;
    let fields = reader.read_string(TYPE_FIELD).and_then(|type_name| {
        let value = reader.read_string(VALUE_FIELD)?;
        reader.read_end_document()?;
        Ok(Envelope::new(type_name, value))
    });
    match fields {
        Ok(envelope) => Ok(envelope),
        Err(err) => {
            warn!(position = reader.position(), %err, "skipping malformed envelope");
            // The document is still open, so skipping cannot fail here.
            reader.skip_document().ok();
            Err(err.into())
        }
    }
}

/// Binary codec for `Watchable<T>`.
pub struct BinaryCodec<'r, T, F: ValueFormat = JsonValueFormat> {
    envelopes: EnvelopeCodec<'r, F>,
    _cell: PhantomData<fn() -> T>,
}

impl<T, F: ValueFormat> fmt::Debug for BinaryCodec<'_, T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryCodec")
            .field("cell", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<T: WireType> Default for BinaryCodec<'static, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: WireType> BinaryCodec<'static, T> {
    /// Codec over the process-wide registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            envelopes: EnvelopeCodec::new(),
            _cell: PhantomData,
        }
    }
}

impl<'r, T: WireType, F: ValueFormat> BinaryCodec<'r, T, F> {
    /// Codec over an explicit format and registry.
    #[must_use]
    pub fn with_registry(format: F, registry: &'r TypeRegistry<F>) -> Self {
        Self {
            envelopes: EnvelopeCodec::with_registry(format, registry),
            _cell: PhantomData,
        }
    }
}

impl<T: WireType, F: ValueFormat> CellCodec for BinaryCodec<'_, T, F> {
    type Value = T;

    fn handled_type(&self) -> String {
        format!("Watchable<{}>", T::wire_name())
    }

    fn encode(&self, writer: &mut dyn DocumentWriter, cell: &Watchable<T>) -> Result<()> {
        let envelope = self.envelopes.encode(cell)?;
        write_envelope(writer, &envelope)
    }

    fn decode(&self, reader: &mut dyn DocumentReader) -> Result<Watchable<T>> {
        let envelope = read_envelope(reader)?;
        self.envelopes.decode(&envelope)
    }
}

/// Binary codec for `Watchable<DynValue>`; resolves every type by name.
pub struct DynBinaryCodec<'r, F: ValueFormat = JsonValueFormat> {
    envelopes: EnvelopeCodec<'r, F>,
}

impl<F: ValueFormat> fmt::Debug for DynBinaryCodec<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynBinaryCodec").finish_non_exhaustive()
    }
}

impl Default for DynBinaryCodec<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl DynBinaryCodec<'static> {
    /// Codec over the process-wide registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            envelopes: EnvelopeCodec::new(),
        }
    }
}

impl<'r, F: ValueFormat> DynBinaryCodec<'r, F> {
    /// Codec over an explicit format and registry.
    #[must_use]
    pub fn with_registry(format: F, registry: &'r TypeRegistry<F>) -> Self {
        Self {
            envelopes: EnvelopeCodec::with_registry(format, registry),
        }
    }
}

impl<F: ValueFormat> CellCodec for DynBinaryCodec<'_, F> {
    type Value = DynValue;

    fn handled_type(&self) -> String {
        "Watchable<DynValue>".to_string()
    }

    fn encode(&self, writer: &mut dyn DocumentWriter, cell: &Watchable<DynValue>) -> Result<()> {
        let envelope = self.envelopes.encode_dyn(cell)?;
        write_envelope(writer, &envelope)
    }

    fn decode(&self, reader: &mut dyn DocumentReader) -> Result<Watchable<DynValue>> {
        let envelope = read_envelope(reader)?;
        self.envelopes.decode_dyn(&envelope)
    }
}

struct CodecEntry {
    handled_type: String,
    codec_type: TypeId,
    /// Holds a `SharedCellCodec<T>` for the keyed `T`.
    codec: Box<dyn Any + Send + Sync>,
}

/// Binary codecs keyed by cell element type.
///
/// This is the attachment point for frameworks that look codecs up by the
/// type being written: register once at start-up, then [`get`](Self::get)
/// or call [`encode`](Self::encode)/[`decode`](Self::decode) directly.
#[derive(Default)]
pub struct CodecRegistry {
    entries: RwLock<HashMap<TypeId, CodecEntry>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("handled_types", &self.handled_types())
            .finish()
    }
}

impl CodecRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding process-wide codecs for the built-in types and
    /// `Watchable<DynValue>`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let codecs = Self::new();
        codecs.register_builtins();
        codecs
    }

    /// Add process-wide codecs for the built-in types and
    /// `Watchable<DynValue>`. Types that already have a codec are skipped.
    pub fn register_builtins(&self) {
        let results = [
            self.register(BinaryCodec::<bool>::new()),
            self.register(BinaryCodec::<char>::new()),
            self.register(BinaryCodec::<i8>::new()),
            self.register(BinaryCodec::<i16>::new()),
            self.register(BinaryCodec::<i32>::new()),
            self.register(BinaryCodec::<i64>::new()),
            self.register(BinaryCodec::<u8>::new()),
            self.register(BinaryCodec::<u16>::new()),
            self.register(BinaryCodec::<u32>::new()),
            self.register(BinaryCodec::<u64>::new()),
            self.register(BinaryCodec::<f32>::new()),
            self.register(BinaryCodec::<f64>::new()),
            self.register(BinaryCodec::<String>::new()),
            self.register(BinaryCodec::<Vec<String>>::new()),
            self.register(DynBinaryCodec::new()),
        ];
        for err in results.into_iter().filter_map(std::result::Result::err) {
            debug!(%err, "skipped built-in codec");
        }
    }

    /// Register `codec` for cells of `C::Value`.
    ///
    /// Registering another instance of the same codec type is a no-op.
    ///
    /// # Errors
    ///
    /// [`WatchError::RegistrationConflict`] when a codec of a different type
    /// already handles `C::Value`.
    pub fn register<C>(&self, codec: C) -> Result<()>
    where
        C: CellCodec + 'static,
    {
        let key = TypeId::of::<C::Value>();
        let codec_type = TypeId::of::<C>();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(&key) {
            if existing.codec_type == codec_type {
                return Ok(());
            }
            return Err(WatchError::RegistrationConflict {
                type_name: existing.handled_type.clone(),
            });
        }

        let handled_type = codec.handled_type();
        debug!(handled_type = %handled_type, "registered cell codec");
        let shared: SharedCellCodec<C::Value> = Arc::new(codec);
        entries.insert(
            key,
            CodecEntry {
                handled_type,
                codec_type,
                codec: Box::new(shared),
            },
        );
        Ok(())
    }

    /// Codec for cells of `T`, if registered.
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<SharedCellCodec<T>> {
        self.entries
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.codec.downcast_ref::<SharedCellCodec<T>>())
            .cloned()
    }

    /// Whether a codec for cells of `T` is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.read().contains_key(&TypeId::of::<T>())
    }

    /// Cell types with a registered codec, sorted.
    #[must_use]
    pub fn handled_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .values()
            .map(|entry| entry.handled_type.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Encode `cell` with the codec registered for `T`.
    ///
    /// # Errors
    ///
    /// [`WatchError::CodecNotFound`], or whatever the codec reports.
    pub fn encode<T: Clone + Send + Sync + 'static>(
        &self,
        writer: &mut dyn DocumentWriter,
        cell: &Watchable<T>,
    ) -> Result<()> {
        self.require::<T>()?.encode(writer, cell)
    }

    /// Decode one cell with the codec registered for `T`.
    ///
    /// # Errors
    ///
    /// [`WatchError::CodecNotFound`] (the reader is not touched), or
    /// whatever the codec reports.
    pub fn decode<T: Clone + Send + Sync + 'static>(
        &self,
        reader: &mut dyn DocumentReader,
    ) -> Result<Watchable<T>> {
        self.require::<T>()?.decode(reader)
    }

    fn require<T: Clone + Send + Sync + 'static>(&self) -> Result<SharedCellCodec<T>> {
        self.get::<T>().ok_or_else(|| WatchError::CodecNotFound {
            handled_type: format!("Watchable<{}>", std::any::type_name::<T>()),
        })
    }
}
