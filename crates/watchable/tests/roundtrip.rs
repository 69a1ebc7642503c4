//! End-to-end round trips through the text and binary forms.
//!
//! Every supported element type is encoded and decoded through both forms,
//! once with the element type known statically and once erased behind
//! `DynValue`. Cells nested inside ordinary serde structures are covered
//! through the serde integration.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use watchable::codec::{BinaryDocumentReader, BinaryDocumentWriter, DocumentReader};
use watchable::{
    BinaryCodec, CellCodec, DynBinaryCodec, DynValue, Envelope, JsonValueFormat, TextCodec,
    TypeRegistry, WatchError, Watchable, WireType, register_builtin_types, register_type,
};

type Log<T> = Arc<Mutex<Vec<(Option<T>, T)>>>;

fn check_text<T: WireType>(registry: &TypeRegistry, value: T) {
    let codec = TextCodec::with_registry(JsonValueFormat, registry);
    let json = codec.to_json(&Watchable::new(value.clone())).unwrap();

    let typed = codec.from_json::<T>(&json).unwrap();
    assert_eq!(typed.get(), Some(value.clone()), "typed text {json}");

    let erased = codec.from_json_dyn(&json).unwrap();
    assert_eq!(erased.get(), Some(DynValue::new(value)), "erased text {json}");
    assert_eq!(codec.to_json_dyn(&erased).unwrap(), json);
}

fn check_binary<T: WireType>(registry: &TypeRegistry, value: T) {
    let typed = BinaryCodec::<T, _>::with_registry(JsonValueFormat, registry);
    let erased = DynBinaryCodec::with_registry(JsonValueFormat, registry);

    let mut writer = BinaryDocumentWriter::new();
    typed.encode(&mut writer, &Watchable::new(value.clone())).unwrap();
    let one = writer.as_bytes().len();
    typed.encode(&mut writer, &Watchable::new(value.clone())).unwrap();
    let bytes = writer.into_bytes();

    let mut reader = BinaryDocumentReader::new(&bytes);
    let first = typed.decode(&mut reader).unwrap();
    assert_eq!(first.get(), Some(value.clone()));
    assert_eq!(reader.position(), one);

    let second = erased.decode(&mut reader).unwrap();
    assert_eq!(second.get(), Some(DynValue::new(value)));
    assert_eq!(reader.position(), bytes.len());
}

fn check_both<T: WireType>(registry: &TypeRegistry, value: T) {
    check_text(registry, value.clone());
    check_binary(registry, value);
}

#[test]
fn every_builtin_type_round_trips() {
    let registry = TypeRegistry::with_builtins();
    check_both(&registry, true);
    check_both(&registry, 'G');
    check_both(&registry, 1i8);
    check_both(&registry, 20i16);
    check_both(&registry, 654i32);
    check_both(&registry, 6_541_337i64);
    check_both(&registry, 255u8);
    check_both(&registry, 65_535u16);
    check_both(&registry, u32::MAX);
    check_both(&registry, u64::MAX);
    check_both(&registry, 3.133f32);
    check_both(&registry, 3.1337f64);
    check_both(&registry, f64::INFINITY);
    check_both(&registry, f32::NEG_INFINITY);
    check_both(&registry, "Hallo".to_string());
    check_both(&registry, String::new());
    check_both(
        &registry,
        vec!["Der".to_string(), "typische".to_string(), "Listen".to_string()],
    );
    check_both(&registry, Vec::<String>::new());
}

#[test]
fn awkward_strings_round_trip() {
    let registry = TypeRegistry::with_builtins();
    for text in ["none", "\"quoted\"", "42", "true", "[1,2]", "tab\tand\nnewline", "ümlaut ✓"] {
        check_both(&registry, text.to_string());
    }
    check_both(&registry, '"');
}

#[test]
fn hello_scenario() {
    let registry = TypeRegistry::new();
    let envelope = TextCodec::with_registry(JsonValueFormat, &registry)
        .encode(&Watchable::new("hello".to_string()))
        .unwrap();
    assert_eq!(envelope, Envelope::new("std::string::String", "hello"));

    let cell = TextCodec::with_registry(JsonValueFormat, &registry)
        .decode::<String>(&envelope)
        .unwrap();
    assert_eq!(cell.get().as_deref(), Some("hello"));
}

#[test]
fn decoded_cell_is_live_and_listener_free() {
    let registry = TypeRegistry::new();
    let codec = TextCodec::with_registry(JsonValueFormat, &registry);

    let source = Watchable::new(5);
    source.watch(|_, _| {});
    let json = codec.to_json(&source).unwrap();

    let decoded = codec.from_json::<i32>(&json).unwrap();
    assert_eq!(decoded.listener_count(), 0);

    let log: Log<i32> = Arc::default();
    let sink = Arc::clone(&log);
    decoded.watch(move |old, new| sink.lock().unwrap().push((old.copied(), *new)));
    decoded.set(10).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![(Some(5), 10)]);
}

#[test]
fn typed_decode_of_other_type_is_a_mismatch() {
    let registry = TypeRegistry::with_builtins();
    let codec = TextCodec::with_registry(JsonValueFormat, &registry);
    let json = codec.to_json(&Watchable::new(1u8)).unwrap();
    assert!(matches!(
        codec.from_json::<String>(&json),
        Err(WatchError::TypeMismatch { .. })
    ));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
    y: i32,
}

impl WireType for Point {
    fn wire_name() -> Cow<'static, str> {
        Cow::Borrowed("roundtrip::Point")
    }
}

#[test]
fn custom_type_needs_registration_only_when_erased() {
    let registry = TypeRegistry::new();
    let codec = TextCodec::with_registry(JsonValueFormat, &registry);
    let json = codec.to_json(&Watchable::new(Point { x: 1, y: -2 })).unwrap();

    assert_eq!(
        codec.from_json::<Point>(&json).unwrap().get(),
        Some(Point { x: 1, y: -2 })
    );
    assert!(matches!(
        codec.from_json_dyn(&json),
        Err(WatchError::TypeResolution { .. })
    ));

    registry.register::<Point>().unwrap();
    let erased = codec.from_json_dyn(&json).unwrap();
    assert_eq!(
        erased.get().and_then(|v| v.downcast::<Point>()),
        Some(Point { x: 1, y: -2 })
    );
}

#[test]
fn nan_round_trips_as_nan() {
    let registry = TypeRegistry::with_builtins();
    let codec = TextCodec::with_registry(JsonValueFormat, &registry);
    let json = codec.to_json(&Watchable::new(f64::NAN)).unwrap();
    assert_eq!(json, r#"{"type":"f64","value":"NaN"}"#);
    assert!(codec.from_json::<f64>(&json).unwrap().get().is_some_and(f64::is_nan));

    let binary = BinaryCodec::<f32, _>::with_registry(JsonValueFormat, &registry);
    let mut writer = BinaryDocumentWriter::new();
    binary.encode(&mut writer, &Watchable::new(f32::NAN)).unwrap();
    let bytes = writer.into_bytes();
    let decoded = binary.decode(&mut BinaryDocumentReader::new(&bytes)).unwrap();
    assert!(decoded.get().is_some_and(f32::is_nan));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UserId(String);

impl WireType for UserId {
    fn wire_name() -> Cow<'static, str> {
        Cow::Borrowed("roundtrip::UserId")
    }
}

#[test]
fn string_newtype_round_trips() {
    let registry = TypeRegistry::new();
    registry.register::<UserId>().unwrap();

    let codec = TextCodec::with_registry(JsonValueFormat, &registry);
    let json = codec.to_json(&Watchable::new(UserId("alice".to_string()))).unwrap();
    assert_eq!(json, r#"{"type":"roundtrip::UserId","value":"alice"}"#);

    check_both(&registry, UserId("alice".to_string()));
    check_both(&registry, UserId("17".to_string()));
}

#[derive(Debug, Serialize, Deserialize)]
struct Settings {
    volume: Watchable<i32>,
    name: Watchable<String>,
    tags: Watchable<Vec<String>>,
    anything: Watchable<DynValue>,
    unset: Watchable<f64>,
}

#[test]
fn nested_cells_use_envelopes() {
    register_builtin_types();
    register_type::<Point>().unwrap();

    let settings = Settings {
        volume: Watchable::new(11),
        name: Watchable::new("main".to_string()),
        tags: Watchable::new(vec!["a".to_string(), "b".to_string()]),
        anything: Watchable::new(DynValue::new(Point { x: 3, y: 4 })),
        unset: Watchable::empty(),
    };

    let json = serde_json::to_value(&settings).unwrap();
    assert_eq!(json["volume"]["type"], "i32");
    assert_eq!(json["volume"]["value"], "11");
    assert_eq!(json["anything"]["type"], "roundtrip::Point");
    assert_eq!(json["unset"]["type"], "none");
    assert_eq!(json["unset"]["value"], "");

    let back: Settings = serde_json::from_value(json).unwrap();
    assert_eq!(back.volume.get(), Some(11));
    assert_eq!(back.name.get().as_deref(), Some("main"));
    assert_eq!(back.tags.get(), Some(vec!["a".to_string(), "b".to_string()]));
    assert_eq!(
        back.anything.get().and_then(|v| v.downcast::<Point>()),
        Some(Point { x: 3, y: 4 })
    );
    assert!(back.unset.is_empty());
}

#[test]
fn nested_unknown_type_fails_deserialization() {
    let json = r#"{"volume":{"type":"i32","value":"1"},
                   "name":{"type":"std::string::String","value":"x"},
                   "tags":{"type":"none","value":""},
                   "anything":{"type":"roundtrip::Missing","value":"{}"},
                   "unset":{"type":"none","value":""}}"#;
    let err = serde_json::from_str::<Settings>(json).unwrap_err();
    assert!(err.to_string().contains("roundtrip::Missing"));
}
