#![forbid(unsafe_code)]

//! Type-preserving wire forms for cells.
//!
//! A cell is written as an envelope of two strings: the fully-qualified
//! name of the value's type and the value rendered by a [`ValueFormat`].
//! The name is what lets a reader rebuild the right Rust type even when the
//! container type alone does not say what it holds.
//!
//! - [`text`]: the envelope as a JSON object, plus serde integration.
//! - [`binary`]: the envelope as one framed [`document`].
//! - [`registry`]: wire name → Rust type resolution.
//!
//! # Invariants
//!
//! 1. Encoding then decoding a cell yields a value-equal cell of the same
//!    type, for every registered type.
//! 2. Decoding never produces a cell holding a type other than the one named
//!    in the envelope.
//! 3. Codecs hold no state between calls; only the registries are shared.

pub mod binary;
pub mod document;
pub mod envelope;
pub mod format;
pub mod registry;
pub mod text;
pub mod wire_type;

pub use binary::{
    BinaryCodec, CellCodec, CodecRegistry, DynBinaryCodec, SharedCellCodec, read_envelope,
    write_envelope,
};
pub use document::{
    BinaryDocumentReader, BinaryDocumentWriter, DocumentError, DocumentReader, DocumentWriter,
};
pub use envelope::{Envelope, EnvelopeCodec, NONE_TYPE_NAME, TYPE_FIELD, VALUE_FIELD};
pub use format::{JsonValueFormat, ValueFormat};
pub use registry::{TypeDescriptor, TypeRegistry, register_builtin_types, register_type, registry};
pub use text::TextCodec;
pub use wire_type::{DynValue, WireType};
