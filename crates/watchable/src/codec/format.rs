#![forbid(unsafe_code)]

//! Generic value ↔ string serializer used inside envelopes.
//!
//! Codecs never render values themselves; they go through a [`ValueFormat`].
//! The default, [`JsonValueFormat`], uses `serde_json` with one adjustment:
//! values that serialize to a JSON string are written raw, so a `String`
//! holding `hello` renders as `hello` rather than `"hello"`.
//!
//! JSON has no spelling for infinities or NaN, so a bare `f32`/`f64` that is
//! not finite renders as `inf`, `-inf` or `NaN` and parses back from them.

use serde::Serialize;
use serde::de::value::{F64Deserializer, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::ser::{self, Impossible, Serializer};

/// Converts values to envelope text and back.
pub trait ValueFormat: Send + Sync + 'static {
    /// Error produced by this format.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Render `value` as envelope text.
    fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, Self::Error>;

    /// Parse envelope text into a `T`.
    fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, Self::Error>;
}

/// `serde_json` backed format with raw strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonValueFormat;

impl ValueFormat for JsonValueFormat {
    type Error = serde_json::Error;

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, Self::Error> {
        if let Ok(Some(token)) = value.serialize(NonFiniteFloat) {
            return Ok(token.to_owned());
        }
        let json = serde_json::to_string(value)?;
        if json.starts_with('"') {
            serde_json::from_str::<String>(&json)
        } else {
            Ok(json)
        }
    }

    fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, Self::Error> {
        // String-like targets (String, char, unit enum variants) accept the raw text.
        let raw: StrDeserializer<'_, serde::de::value::Error> = text.into_deserializer();
        if let Ok(value) = T::deserialize(raw) {
            return Ok(value);
        }
        if let Some(float) = parse_non_finite(text) {
            let de: F64Deserializer<serde_json::Error> = float.into_deserializer();
            if let Ok(value) = T::deserialize(de) {
                return Ok(value);
            }
        }
        // Newtypes and other wrappers around strings only accept a real string value.
        let quoted = serde_json::Value::String(text.to_owned());
        if let Ok(value) = serde_json::from_value(quoted) {
            return Ok(value);
        }
        serde_json::from_str(text)
    }
}

const INFINITY: &str = "inf";
const NEG_INFINITY: &str = "-inf";
const NAN: &str = "NaN";

fn non_finite_token(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some(NAN)
    } else if value == f64::INFINITY {
        Some(INFINITY)
    } else if value == f64::NEG_INFINITY {
        Some(NEG_INFINITY)
    } else {
        None
    }
}

fn parse_non_finite(text: &str) -> Option<f64> {
    match text {
        INFINITY => Some(f64::INFINITY),
        NEG_INFINITY => Some(f64::NEG_INFINITY),
        NAN => Some(f64::NAN),
        _ => None,
    }
}

/// Serializer that only answers for a bare non-finite float.
///
/// Every other shape yields `Ok(None)` or an error, and the caller falls back
/// to `serde_json`.
struct NonFiniteFloat;

type NotAFloat = Impossible<Option<&'static str>, serde_json::Error>;

macro_rules! not_a_float {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, _: $ty) -> Result<Self::Ok, Self::Error> {
                Ok(None)
            }
        )*
    };
}

fn compound<T>() -> Result<T, serde_json::Error> {
    Err(ser::Error::custom("not a float"))
}

impl Serializer for NonFiniteFloat {
    type Ok = Option<&'static str>;
    type Error = serde_json::Error;
    type SerializeSeq = NotAFloat;
    type SerializeTuple = NotAFloat;
    type SerializeTupleStruct = NotAFloat;
    type SerializeTupleVariant = NotAFloat;
    type SerializeMap = NotAFloat;
    type SerializeStruct = NotAFloat;
    type SerializeStructVariant = NotAFloat;

    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        Ok(non_finite_token(f64::from(v)))
    }

    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        Ok(non_finite_token(v))
    }

    not_a_float! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
        serialize_unit_struct: &'static str,
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        compound()
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, Self::Error> {
        compound()
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        compound()
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        compound()
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        compound()
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        compound()
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        compound()
    }

    fn collect_str<T: std::fmt::Display + ?Sized>(self, _: &T) -> Result<Self::Ok, Self::Error> {
        Ok(None)
    }
}
