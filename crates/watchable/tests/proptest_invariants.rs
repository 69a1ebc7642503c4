//! Property-based invariant tests for cells and codecs.
//!
//! **Cell:**
//! 1. `get` returns the last value passed to `set`.
//! 2. `version` equals the number of `set` calls.
//! 3. Listeners run in registration order, once per registration.
//! 4. Each notification carries the previous notification's new value as
//!    its old value.
//!
//! **Dispatch:**
//! 5. Continue-and-aggregate runs every listener and reports exactly the
//!    failing ones, in order.
//! 6. Fail-fast runs listeners up to and including the first failure.
//!
//! **Codecs:**
//! 7. Text round trip preserves value and type.
//! 8. Binary round trip of a stream of cells consumes the stream exactly.
//! 9. Decoding arbitrary bytes never panics, and a failed decode never
//!    leaves the cursor inside a document.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use watchable::codec::{BinaryDocumentReader, BinaryDocumentWriter, DocumentReader};
use watchable::{
    BinaryCodec, CellCodec, DispatchPolicy, DynBinaryCodec, DynValue, JsonValueFormat,
    ListenerError, TextCodec, TypeRegistry, Watchable, WatchableConfig,
};

// ── Strategies ────────────────────────────────────────────────────────────

fn failure_mask(max_len: usize) -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(proptest::bool::ANY, 1..=max_len)
}

type RunLog = Arc<Mutex<Vec<usize>>>;

fn cell_with_mask(mask: &[bool], policy: DispatchPolicy) -> (Watchable<u8>, RunLog) {
    let cell = Watchable::with_config(
        Some(0u8),
        WatchableConfig::new().with_dispatch_policy(policy),
    );
    let ran = Arc::new(Mutex::new(Vec::new()));
    for (index, &fails) in mask.iter().enumerate() {
        let ran = Arc::clone(&ran);
        cell.try_watch(move |_, _| {
            ran.lock().unwrap().push(index);
            if fails {
                Err(ListenerError::new(format!("listener {index}")))
            } else {
                Ok(())
            }
        });
    }
    (cell, ran)
}

// ═════════════════════════════════════════════════════════════════════════
// Cell
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn get_returns_last_set(values in proptest::collection::vec(any::<i64>(), 1..50)) {
        let cell = Watchable::empty();
        for &v in &values {
            cell.set(v).unwrap();
        }
        prop_assert_eq!(cell.get(), values.last().copied());
        prop_assert_eq!(cell.version(), values.len() as u64);
    }

    #[test]
    fn listeners_run_in_registration_order(count in 1usize..20, sets in 1usize..5) {
        let cell = Watchable::new(0usize);
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in 0..count {
            let order = Arc::clone(&order);
            cell.watch(move |_, _| order.lock().unwrap().push(id));
        }
        for v in 0..sets {
            cell.set(v).unwrap();
        }
        let expected: Vec<usize> = (0..sets).flat_map(|_| 0..count).collect();
        prop_assert_eq!(order.lock().unwrap().clone(), expected);
    }

    #[test]
    fn notifications_chain(
        start in any::<i32>(),
        values in proptest::collection::vec(any::<i32>(), 1..30),
    ) {
        let cell = Watchable::new(start);
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        cell.watch(move |old: Option<&i32>, new: &i32| {
            sink.lock().unwrap().push((old.copied(), *new));
        });
        for &v in &values {
            cell.set(v).unwrap();
        }
        let log = log.lock().unwrap();
        let mut previous = start;
        for (i, &(old, new)) in log.iter().enumerate() {
            prop_assert_eq!(old, Some(previous));
            prop_assert_eq!(new, values[i]);
            previous = new;
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Dispatch
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn aggregate_reports_every_failure(mask in failure_mask(16)) {
        let (cell, ran) = cell_with_mask(&mask, DispatchPolicy::ContinueAndAggregate);
        let result = cell.set(1);

        prop_assert_eq!(ran.lock().unwrap().clone(), (0..mask.len()).collect::<Vec<_>>());
        let failing: Vec<usize> =
            mask.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect();
        match result {
            Ok(()) => prop_assert!(failing.is_empty()),
            Err(err) => {
                let reported: Vec<usize> =
                    err.listener_failures().iter().map(|f| f.index).collect();
                prop_assert_eq!(reported, failing);
            }
        }
        prop_assert_eq!(cell.get(), Some(1));
    }

    #[test]
    fn fail_fast_stops_at_first_failure(mask in failure_mask(16)) {
        let (cell, ran) = cell_with_mask(&mask, DispatchPolicy::FailFast);
        let result = cell.set(1);

        match mask.iter().position(|&f| f) {
            None => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(ran.lock().unwrap().len(), mask.len());
            }
            Some(first) => {
                let err = result.unwrap_err();
                prop_assert_eq!(err.listener_failures().len(), 1);
                prop_assert_eq!(err.listener_failures()[0].index, first);
                prop_assert_eq!(ran.lock().unwrap().clone(), (0..=first).collect::<Vec<_>>());
            }
        }
        prop_assert_eq!(cell.get(), Some(1));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Codecs
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn text_round_trip_strings(text in any::<String>()) {
        let registry = TypeRegistry::with_builtins();
        let codec = TextCodec::with_registry(JsonValueFormat, &registry);
        let json = codec.to_json(&Watchable::new(text.clone())).unwrap();
        prop_assert_eq!(codec.from_json::<String>(&json).unwrap().get(), Some(text.clone()));
        prop_assert_eq!(codec.from_json_dyn(&json).unwrap().get(), Some(DynValue::new(text)));
    }

    #[test]
    fn text_round_trip_numbers(int in any::<i64>(), float in prop::num::f64::ANY) {
        let registry = TypeRegistry::with_builtins();
        let codec = TextCodec::with_registry(JsonValueFormat, &registry);

        let json = codec.to_json(&Watchable::new(int)).unwrap();
        prop_assert_eq!(codec.from_json::<i64>(&json).unwrap().get(), Some(int));

        let json = codec.to_json(&Watchable::new(float)).unwrap();
        let back = codec.from_json::<f64>(&json).unwrap().get();
        if float.is_nan() {
            prop_assert!(back.is_some_and(f64::is_nan));
        } else {
            prop_assert_eq!(back, Some(float));
        }
    }

    #[test]
    fn text_round_trip_lists(list in proptest::collection::vec(any::<String>(), 0..8)) {
        let registry = TypeRegistry::with_builtins();
        let codec = TextCodec::with_registry(JsonValueFormat, &registry);
        let json = codec.to_json(&Watchable::new(list.clone())).unwrap();
        let erased = codec.from_json_dyn(&json).unwrap();
        prop_assert_eq!(erased.get().and_then(|v| v.downcast::<Vec<String>>()), Some(list));
    }

    #[test]
    fn binary_stream_round_trip(
        values in proptest::collection::vec(proptest::option::of(any::<i32>()), 0..20),
    ) {
        let registry = TypeRegistry::new();
        let codec = BinaryCodec::<i32, _>::with_registry(JsonValueFormat, &registry);

        let mut writer = BinaryDocumentWriter::new();
        for value in &values {
            let cell = value.map_or_else(Watchable::empty, Watchable::new);
            codec.encode(&mut writer, &cell).unwrap();
        }
        let bytes = writer.into_bytes();

        let mut reader = BinaryDocumentReader::new(&bytes);
        for value in &values {
            prop_assert_eq!(codec.decode(&mut reader).unwrap().get(), *value);
        }
        prop_assert!(reader.is_exhausted());
    }

    #[test]
    fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
        let registry = TypeRegistry::with_builtins();
        let codec = DynBinaryCodec::with_registry(JsonValueFormat, &registry);
        let mut reader = BinaryDocumentReader::new(&bytes);
        if codec.decode(&mut reader).is_err() {
            let after = reader.position();
            if after != 0 {
                // The frame opened, so the whole declared frame was consumed.
                let declared = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                prop_assert_eq!(Ok(after), usize::try_from(declared));
            }
            prop_assert!(reader.skip_document().is_err(), "document left open");
        }
    }
}
