#![no_main]
use libfuzzer_sys::fuzz_target;
use rser::value::{Record, Value};
use rser::{FrameEvent, Framer, FramerOptions, decode_value, encode_message, encode_value};

/// Grow a value graph from fuzz bytes, sharing earlier nodes by index.
fn build(data: &[u8]) -> Value {
    let mut nodes: Vec<Value> = Vec::new();
    for pair in data.chunks(2) {
        let op = pair[0];
        let arg = pair.get(1).copied().unwrap_or(0);
        let pick = |nodes: &[Value]| {
            if nodes.is_empty() {
                Value::Null
            } else {
                nodes[arg as usize % nodes.len()].clone()
            }
        };
        let node = match op % 8 {
            0 => Value::Number(f64::from(arg as i8) * 1000.5),
            1 => Value::from(format!("s{arg}")),
            2 => Value::BigInt(i64::from(arg) << 40),
            3 => Value::array(vec![pick(&nodes), pick(&nodes)]),
            4 => Value::object([("k", pick(&nodes)), ("n", Value::Null)]),
            5 => Value::set([pick(&nodes), Value::from(arg as i32)]),
            6 => Value::map([(Value::from(arg as i32), pick(&nodes))]),
            _ => Value::from(Record::new()),
        };
        nodes.push(node);
    }
    Value::array(nodes)
}

fuzz_target!(|data: &[u8]| {
    let value = build(&data[..data.len().min(512)]);

    let bytes = encode_value(&value).unwrap();
    assert_eq!(rser::measure_value(&value).unwrap(), bytes.len());
    assert_eq!(decode_value(&bytes).unwrap(), value);

    // Same value through the framer one byte at a time.
    let message = encode_message(&value).unwrap();
    let mut framer = Framer::new(FramerOptions::default());
    let mut events = Vec::new();
    for b in message.chunks(1) {
        framer.append(b, &mut events).unwrap();
    }
    assert!(matches!(&events[..], [FrameEvent::Value(v)] if *v == value));
});
