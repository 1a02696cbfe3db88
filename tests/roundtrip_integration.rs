use rser::value::{
    BinaryValue, ErrorKind, ErrorValue, PathCollection, PathFlavor, PathValue, Record,
    RecordArray, RegExpFlags, RegExpValue, StackFrame, ViewKind,
};
use rser::wire::{DecodeOptions, Encoder, KeyCache, decode_value_with};
use rser::{
    RserError, Value, decode_message, decode_value, encode_message, encode_value, measure_value,
};

fn roundtrip(value: &Value) -> Value {
    let bytes = encode_value(value).unwrap();
    assert_eq!(measure_value(value).unwrap(), bytes.len());
    decode_value(&bytes).unwrap()
}

fn every_kind() -> Vec<Value> {
    let mut records = RecordArray::new(vec!["id".into(), "name".into()]);
    records.push_row(vec![Value::from(1), Value::from("a")]);
    records.push_row(vec![Value::from(2), Value::from("b")]);

    let mut paths = PathCollection::new(PathFlavor::Mixed);
    paths
        .items
        .push(Value::Path(PathValue::new(PathFlavor::Url, "https://example.com/x")));
    paths
        .items
        .push(Value::Path(PathValue::new(PathFlavor::Uid, "0x1f")));

    let mut err = ErrorValue::new(ErrorKind::RangeError, "index out of range")
        .with_stack("RangeError: index out of range\n    at f (a.js:3:9)")
        .with_frame(StackFrame {
            function_name: Some("f".into()),
            file_name: Some("a.js".into()),
            line: 3,
            column: 9,
        })
        .with_frame(StackFrame::default());
    err.properties.insert("code", Value::from("E_RANGE"));

    vec![
        Value::Undefined,
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Number(0.0),
        Value::Number(-0.0),
        Value::Number(1.0),
        Value::Number(-1.0),
        Value::Number(-129.0),
        Value::Number(70_000.0),
        Value::Number(3.25),
        Value::Number(1e300),
        Value::Number(f64::NAN),
        Value::Number(f64::INFINITY),
        Value::Number(f64::NEG_INFINITY),
        Value::BigInt(i64::MIN),
        Value::BigInt(i64::MAX),
        Value::from("plain"),
        Value::from("ünïcödé ✓"),
        Value::Symbol("Symbol.iterator".into()),
        Value::Date(-86_400_000),
        Value::Date(1_700_000_000_123),
        Value::RegExp(RegExpValue::new(
            "^\\d+$",
            RegExpFlags::MULTILINE | RegExpFlags::STICKY | RegExpFlags::UNICODE,
        )),
        Value::array(vec![Value::Null, Value::from("x"), Value::array(vec![])]),
        Value::records(records),
        Value::map([
            (Value::from("k"), Value::from(1)),
            (Value::Number(f64::NAN), Value::Null),
        ]),
        Value::set([Value::from(1), Value::from("1")]),
        Value::object([("a", Value::from(1)), ("b", Value::Bool(false))]),
        Value::from(err),
        Value::Binary(BinaryValue::Buffer((0..=255).collect())),
        Value::Binary(BinaryValue::View {
            kind: ViewKind::Float64,
            bytes: 1.5f64.to_le_bytes().to_vec(),
        }),
        Value::Path(PathValue::new(PathFlavor::Absolute, "/usr/lib")),
        Value::path_collection(paths),
    ]
}

#[test]
fn every_kind_roundtrips() {
    for value in every_kind() {
        let back = roundtrip(&value);
        assert_eq!(back, value, "kind {}", value.kind_name());
        assert_eq!(back.kind_name(), value.kind_name());
    }
}

#[test]
fn all_kinds_in_one_container_roundtrip() {
    let root = Value::array(every_kind());
    assert_eq!(roundtrip(&root), root);
}

#[test]
fn undefined_object_fields_are_dropped() {
    let value = Value::object([
        ("a", Value::from(1)),
        ("b", Value::Undefined),
        ("c", Value::Null),
    ]);
    let back = roundtrip(&value);
    let record = back.as_object().unwrap();
    let record = record.borrow();
    assert_eq!(record.len(), 2);
    assert!(!record.contains_key("b"));
    assert_eq!(record.get("c"), Some(&Value::Null));
}

#[test]
fn negative_zero_keeps_its_sign() {
    match roundtrip(&Value::Number(-0.0)) {
        Value::Number(n) => assert!(n == 0.0 && n.is_sign_negative()),
        other => panic!("expected number, got {other:?}"),
    }
}

#[test]
fn shared_composite_decodes_to_one_handle() {
    let shared = Value::object([("x", Value::from(1))]);
    let root = Value::array(vec![shared.clone(), Value::Null, shared]);
    let back = roundtrip(&root);

    let items = back.as_array().unwrap();
    let items = items.borrow();
    assert!(items[0].ptr_eq(&items[2]));

    // Mutation through one slot is visible through the other.
    items[0]
        .as_object()
        .unwrap()
        .borrow_mut()
        .insert("y", Value::from(2));
    assert!(items[2].as_object().unwrap().borrow().contains_key("y"));
}

#[test]
fn distinct_but_equal_composites_stay_distinct() {
    let root = Value::array(vec![
        Value::array(vec![Value::from(1)]),
        Value::array(vec![Value::from(1)]),
    ]);
    let back = roundtrip(&root);
    let items = back.as_array().unwrap();
    let items = items.borrow();
    assert_eq!(items[0], items[1]);
    assert!(!items[0].ptr_eq(&items[1]));
}

#[test]
fn plain_strings_are_written_in_full_each_time() {
    let one = encode_value(&Value::array(vec![Value::from("repeat")])).unwrap();
    let two =
        encode_value(&Value::array(vec![Value::from("repeat"), Value::from("repeat")])).unwrap();
    // Array tag + count, then one full STRING per slot.
    let item = one.len() - 2;
    assert_eq!(two.len(), 3 + 2 * item);
}

#[test]
fn shared_string_is_written_once() {
    let s = Value::shared_string("a fairly long shared string");
    let root = Value::array(vec![s.clone(), s.clone(), s]);
    let bytes = encode_value(&root).unwrap();
    assert!(bytes.len() < 2 * "a fairly long shared string".len());

    let back = decode_value(&bytes).unwrap();
    let items = back.as_array().unwrap();
    let items = items.borrow();
    assert!(items[0].ptr_eq(&items[1]));
    assert!(items[1].ptr_eq(&items[2]));
    assert_eq!(items[0].as_str(), Some("a fairly long shared string"));
}

#[test]
fn object_cycle_roundtrips() {
    let node = Value::object([("name", Value::from("root"))]);
    node.as_object()
        .unwrap()
        .borrow_mut()
        .insert("self", node.clone());

    let back = roundtrip(&node);
    let record = back.as_object().unwrap();
    assert!(record.borrow().get("self").unwrap().ptr_eq(&back));

    record.borrow_mut().remove("self");
    node.as_object().unwrap().borrow_mut().remove("self");
}

#[test]
fn mutual_cycle_through_map_and_set_roundtrips() {
    let set = Value::set([]);
    let map = Value::map([(Value::from("set"), set.clone())]);
    set.as_set().unwrap().borrow_mut().insert(map.clone());

    let back = roundtrip(&map);
    let inner_set = back
        .as_map()
        .unwrap()
        .borrow()
        .get(&Value::from("set"))
        .unwrap()
        .clone();
    let members: Vec<Value> = inner_set.as_set().unwrap().borrow().iter().cloned().collect();
    assert_eq!(members.len(), 1);
    assert!(members[0].ptr_eq(&back));

    // Break both cycles.
    back.as_map().unwrap().borrow_mut().remove(&Value::from("set"));
    map.as_map().unwrap().borrow_mut().remove(&Value::from("set"));
}

#[test]
fn shared_value_inside_records_and_errors() {
    let shared = Value::array(vec![Value::from("tag")]);
    let mut records = RecordArray::new(vec!["tags".into()]);
    records.push_row(vec![shared.clone()]);
    records.push_row(vec![shared.clone()]);

    let mut err = ErrorValue::new(ErrorKind::Error, "boom");
    err.properties.insert("tags", shared);

    let root = Value::array(vec![Value::records(records), Value::from(err)]);
    let back = roundtrip(&root);

    let items = back.as_array().unwrap();
    let items = items.borrow();
    let Value::Records(records) = &items[0] else {
        panic!("expected records");
    };
    let Value::Error(err) = &items[1] else {
        panic!("expected error");
    };
    let records = records.borrow();
    let first = records.get(0, "tags").unwrap();
    assert!(first.ptr_eq(records.get(1, "tags").unwrap()));
    assert!(first.ptr_eq(err.properties.get("tags").unwrap()));
}

#[test]
fn scenario_object_bytes() {
    let value = Value::object([
        ("a", Value::from(1)),
        (
            "b",
            Value::array(vec![Value::from(1), Value::from(2), Value::from("x")]),
        ),
        ("c", Value::Undefined),
    ]);
    let bytes = encode_value(&value).unwrap();
    assert_eq!(
        bytes,
        [
            0x18, 0x07, 0x02, 0x05, b'a', 0x05, 0x05, b'b', 0x14, 0x07, 0x03, 0x05, 0x07, 0x02,
            0x10, 0x05, b'x'
        ]
    );
}

#[test]
fn encoder_write_into_exact_buffer() {
    let shared = Value::array(vec![Value::from("s")]);
    let value = Value::object([("p", shared.clone()), ("q", shared)]);

    let mut encoder = Encoder::new();
    let size = encoder.measure(&value).unwrap();
    let mut buf = vec![0u8; size];
    assert_eq!(encoder.write_into(&value, &mut buf).unwrap(), size);
    assert_eq!(buf, encode_value(&value).unwrap());
}

#[test]
fn encoder_is_reusable_across_values() {
    let mut encoder = Encoder::new();
    for value in every_kind() {
        let size = encoder.measure(&value).unwrap();
        let mut buf = vec![0u8; size];
        encoder.write_into(&value, &mut buf).unwrap();
        assert_eq!(decode_value(&buf).unwrap(), value);
    }
}

#[test]
fn message_roundtrip_and_length_checks() {
    let value = Value::object([("hello", Value::from("world"))]);
    let message = encode_message(&value).unwrap();
    assert_eq!(decode_message(&message).unwrap(), value);

    assert!(matches!(
        decode_message(&message[..message.len() - 1]),
        Err(RserError::Truncated { .. })
    ));

    let mut long = message.clone();
    long.push(0x01);
    assert!(matches!(
        decode_message(&long),
        Err(RserError::Malformed { .. })
    ));
}

#[test]
fn unsupported_values_fail_before_writing() {
    let mut bad = RecordArray::new(vec!["a".into(), "b".into()]);
    bad.rows.push(vec![Value::from(1)]);
    assert!(matches!(
        encode_value(&Value::records(bad)),
        Err(RserError::UnsupportedValue { .. })
    ));

    assert!(matches!(
        encode_value(&Value::Date(i64::MAX)),
        Err(RserError::UnsupportedValue { kind: "date", .. })
    ));
}

#[test]
fn depth_limit_is_enforced() {
    let mut value = Value::Null;
    for _ in 0..64 {
        value = Value::array(vec![value]);
    }
    let bytes = encode_value(&value).unwrap();

    let tight = DecodeOptions {
        max_depth: 16,
        ..DecodeOptions::default()
    };
    assert!(matches!(
        decode_value_with(&bytes, &tight, None),
        Err(RserError::DepthLimit { limit: 16, .. })
    ));
    assert_eq!(decode_value(&bytes).unwrap(), value);
}

#[test]
fn key_cache_is_shared_across_payloads() {
    let value = Value::object([("id", Value::from(1)), ("kind", Value::from("x"))]);
    let bytes = encode_value(&value).unwrap();

    let mut cache = KeyCache::new();
    for _ in 0..3 {
        let back = decode_value_with(&bytes, &DecodeOptions::default(), Some(&mut cache)).unwrap();
        assert_eq!(back, value);
    }
    assert_eq!(cache.misses(), 2);
    assert_eq!(cache.hits(), 4);
}

#[test]
fn length_limit_rejects_large_counts() {
    let value = Value::array(vec![Value::Null; 100]);
    let bytes = encode_value(&value).unwrap();
    let tight = DecodeOptions {
        max_length: 10,
        ..DecodeOptions::default()
    };
    assert!(decode_value_with(&bytes, &tight, None).is_err());
}

#[test]
fn record_field_order_is_preserved() {
    let mut record = Record::new();
    for key in ["zeta", "alpha", "mid"] {
        record.insert(key, Value::from(key));
    }
    let back = roundtrip(&Value::from(record));
    let keys: Vec<String> = back
        .as_object()
        .unwrap()
        .borrow()
        .keys()
        .map(str::to_owned)
        .collect();
    assert_eq!(keys, ["zeta", "alpha", "mid"]);
}
