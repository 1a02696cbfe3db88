use rser::value::{
    BinaryValue, ErrorKind, ErrorValue, PathCollection, PathFlavor, PathValue, RecordArray,
    RegExpFlags, RegExpValue, ViewKind,
};
use rser::{Value, decode_value, encode_value, measure_value};

#[derive(Debug)]
struct Vector {
    name: String,
    encoded: Vec<u8>,
}

fn hex_to_bytes(s: &str) -> Vec<u8> {
    let s = s.trim();
    if s.is_empty() {
        return Vec::new();
    }
    assert!(
        s.len().is_multiple_of(2),
        "hex string must have even length"
    );
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn load_vectors() -> Vec<Vector> {
    let manifest = include_str!("vectors/manifest.tsv");
    manifest
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let parts: Vec<_> = line.split('|').collect();
            assert_eq!(parts.len(), 3, "invalid vector row: {line}");
            Vector {
                name: parts[0].to_string(),
                encoded: hex_to_bytes(parts[2]),
            }
        })
        .collect()
}

fn self_cycle() -> Value {
    let arr = Value::array(vec![]);
    if let Value::Array(rc) = &arr {
        rc.borrow_mut().push(arr.clone());
    }
    arr
}

/// The value each manifest row encodes.
fn build(name: &str) -> Value {
    match name {
        "undefined" => Value::Undefined,
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "zero" => Value::Number(0.0),
        "one" => Value::Number(1.0),
        "neg_one" => Value::Number(-1.0),
        "int8_127" => Value::Number(127.0),
        "int8_neg128" => Value::Number(-128.0),
        "int16_128" => Value::Number(128.0),
        "int16_32767" => Value::Number(32767.0),
        "int32_max" => Value::Number(f64::from(i32::MAX)),
        "int32_min" => Value::Number(f64::from(i32::MIN)),
        "float_2pow31" => Value::Number(2147483648.0),
        "float_half" => Value::Number(0.5),
        "float_neg" => Value::Number(-1.5),
        "nan" => Value::Number(f64::NAN),
        "inf" => Value::Number(f64::INFINITY),
        "neg_inf" => Value::Number(f64::NEG_INFINITY),
        "neg_zero" => Value::Number(-0.0),
        "bigint_one" => Value::BigInt(1),
        "bigint_neg" => Value::BigInt(-2),
        "string_empty" => Value::from(""),
        "string_hi" => Value::from("hi"),
        "string_utf8" => Value::from("é"),
        "symbol" => Value::Symbol("it".into()),
        "date_zero" => Value::Date(0),
        "date_large" => Value::Date(1_000_000_000_000),
        "regexp" => Value::RegExp(RegExpValue::new(
            "a+",
            RegExpFlags::IGNORE_CASE | RegExpFlags::GLOBAL,
        )),
        "array_empty" => Value::array(vec![]),
        "array_mixed" => Value::array(vec![Value::from(1), Value::from("x")]),
        "object_scenario" => Value::object([
            ("a", Value::from(1)),
            (
                "b",
                Value::array(vec![Value::from(1), Value::from(2), Value::from("x")]),
            ),
            ("c", Value::Undefined),
        ]),
        "shared_array" => {
            let s = Value::array(vec![Value::Null]);
            Value::array(vec![s.clone(), s])
        }
        "self_cycle" => self_cycle(),
        "shared_string" => {
            let s = Value::shared_string("k");
            Value::array(vec![s.clone(), s])
        }
        "map" => Value::map([(Value::from(1), Value::from("a"))]),
        "set" => Value::set([Value::Bool(true)]),
        "templated" => {
            let mut ra = RecordArray::new(vec!["id".into()]);
            ra.push_row(vec![Value::from(1)]);
            ra.push_row(vec![Value::from(2)]);
            Value::records(ra)
        }
        "error" => Value::from(ErrorValue::new(ErrorKind::TypeError, "x")),
        "array_buffer" => Value::Binary(BinaryValue::Buffer(vec![1, 2])),
        "typed_uint16" => Value::Binary(BinaryValue::View {
            kind: ViewKind::Uint16,
            bytes: vec![0, 1],
        }),
        "path" => Value::Path(PathValue::new(PathFlavor::Relative, "a/b")),
        "path_collection" => {
            let mut pc = PathCollection::new(PathFlavor::Absolute);
            pc.items
                .push(Value::Path(PathValue::new(PathFlavor::Absolute, "/x")));
            Value::path_collection(pc)
        }
        other => panic!("no builder for vector {other}"),
    }
}

/// Break self-references so the test does not leak.
fn release(v: &Value) {
    if let Value::Array(rc) = v
        && rc.borrow().iter().any(|item| item.ptr_eq(v))
    {
        rc.borrow_mut().clear();
    }
}

#[test]
fn vector_database_is_non_empty() {
    let vectors = load_vectors();
    assert!(vectors.len() > 40);
}

#[test]
fn encode_matches_all_vectors() {
    for v in load_vectors() {
        let value = build(&v.name);
        let encoded = encode_value(&value).unwrap();
        assert_eq!(encoded, v.encoded, "vector {}", v.name);
        assert_eq!(
            measure_value(&value).unwrap(),
            v.encoded.len(),
            "vector {}",
            v.name
        );
        release(&value);
    }
}

#[test]
fn decode_matches_all_vectors() {
    for v in load_vectors() {
        let expected = build(&v.name);
        let decoded = decode_value(&v.encoded)
            .unwrap_or_else(|e| panic!("vector {}: {e}", v.name));
        assert_eq!(decoded, expected, "vector {}", v.name);
        release(&expected);
        release(&decoded);
    }
}

#[test]
fn reencode_is_stable_for_all_vectors() {
    for v in load_vectors() {
        let decoded = decode_value(&v.encoded).unwrap();
        assert_eq!(encode_value(&decoded).unwrap(), v.encoded, "vector {}", v.name);
        release(&decoded);
    }
}

#[test]
fn int64_on_the_wire_is_always_bigint() {
    let mut bytes = vec![0x0A];
    bytes.extend_from_slice(&7i64.to_be_bytes());
    assert_eq!(decode_value(&bytes).unwrap(), Value::BigInt(7));
}
