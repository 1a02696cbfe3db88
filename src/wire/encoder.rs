// RSER encoder: one traversal, two sinks.
//
// Encoding is a measuring pass into `SizeCounter` followed by a writing pass
// into a `SliceWriter` over an exactly-sized buffer.  Both passes run the
// same `Encoder::encode` and share one reference table, so the measured
// size always equals the written size.
//
// Composite bodies are borrowed only while their own fields are written.
// A cyclic back-edge is answered by the reference table before the body is
// borrowed again.

use log::trace;

use super::code_table::Tag;
use super::header;
use super::reference::EncodeRefs;
use super::sink::{MAX_SAFE_INTEGER, SizeCounter, SliceWriter, Sink};
use crate::error::{Result, RserError};
use crate::value::{
    BinaryValue, ErrorValue, MapValue, PathCollection, Record, RecordArray, SetValue, StackFrame,
    Value,
};

/// Drives the measuring and writing passes for one value.
#[derive(Debug, Default)]
pub struct Encoder {
    refs: EncodeRefs,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the measuring pass and seal the reference table.  Returns the
    /// exact encoded size of `value`.
    pub fn measure(&mut self, value: &Value) -> Result<usize> {
        self.refs = EncodeRefs::new();
        let mut counter = SizeCounter::new();
        self.encode(value, &mut counter)?;
        self.refs.seal();
        Ok(counter.len())
    }

    /// Measure `value` and write it into the front of `buf`.  Returns the
    /// number of bytes written.
    ///
    /// Always measures `value` itself, so the encoder may be reused for any
    /// sequence of values.  A short `buf` is an error and is left untouched.
    pub fn write_into(&mut self, value: &Value, buf: &mut [u8]) -> Result<usize> {
        let size = self.measure(value)?;
        self.write_measured(value, size, buf)
    }

    /// Writing pass against the table the preceding `measure` sealed.
    /// The table is reset afterwards, whatever the outcome.
    fn write_measured(&mut self, value: &Value, size: usize, buf: &mut [u8]) -> Result<usize> {
        let result = match buf.get_mut(..size) {
            Some(out) => {
                let mut writer = SliceWriter::new(out);
                self.encode(value, &mut writer).map(|()| writer.position())
            }
            None => Err(RserError::OutputTooSmall {
                needed: size,
                available: buf.len(),
            }),
        };
        self.refs = EncodeRefs::new();
        let written = result?;
        debug_assert_eq!(written, size, "measured and written sizes differ");
        Ok(written)
    }

    /// Encode `value` into `sink`.  Referenceable values consult the
    /// reference table first.
    pub fn encode<S: Sink>(&mut self, value: &Value, sink: &mut S) -> Result<()> {
        if let Some(identity) = value.identity()
            && self.refs.encode_possible_reference(identity, sink)
        {
            return Ok(());
        }

        match value {
            Value::Undefined => sink.write_tag(Tag::Undefined),
            Value::Null => sink.write_tag(Tag::Null),
            Value::Bool(true) => sink.write_tag(Tag::True),
            Value::Bool(false) => sink.write_tag(Tag::False),
            Value::Number(n) => sink.write_number(*n),
            Value::BigInt(i) => sink.write_bigint(*i),
            Value::String(s) => {
                sink.write_tag(Tag::String);
                sink.write_str(s);
            }
            Value::SharedString(s) => {
                sink.write_tag(Tag::String);
                sink.write_str(s);
            }
            Value::Symbol(key) => {
                sink.write_tag(Tag::Symbol);
                sink.write_str(key);
            }
            Value::Date(ms) => {
                if ms.unsigned_abs() > MAX_SAFE_INTEGER as u64 {
                    return Err(RserError::unsupported(
                        "date",
                        format!("timestamp {ms} is outside the representable range"),
                    ));
                }
                sink.write_tag(Tag::Date);
                sink.write_number(*ms as f64);
            }
            Value::RegExp(re) => {
                sink.write_tag(Tag::RegExp);
                sink.write_str(&re.source);
                sink.write_str(&re.flags.to_string());
            }
            Value::Array(items) => {
                sink.write_tag(Tag::Array);
                self.encode_seq(items.borrow().iter(), sink)?;
            }
            Value::Records(records) => self.encode_records(&records.borrow(), sink)?,
            Value::Map(map) => self.encode_map(&map.borrow(), sink)?,
            Value::Set(set) => self.encode_set(&set.borrow(), sink)?,
            Value::Object(record) => {
                sink.write_tag(Tag::Object);
                self.encode_fields(&record.borrow(), sink)?;
            }
            Value::Error(err) => self.encode_error(err, sink)?,
            Value::Binary(binary) => encode_binary(binary, sink)?,
            Value::Path(path) => {
                sink.write_tag(Tag::Path);
                sink.write_byte(path.flavor.code());
                sink.write_str(&path.path);
            }
            Value::PathCollection(paths) => self.encode_paths(&paths.borrow(), sink)?,
        }
        Ok(())
    }

    fn encode_seq<'v, S: Sink>(
        &mut self,
        items: impl ExactSizeIterator<Item = &'v Value>,
        sink: &mut S,
    ) -> Result<()> {
        sink.write_length(items.len());
        for item in items {
            self.encode(item, sink)?;
        }
        Ok(())
    }

    /// Count + key/value pairs; undefined fields are omitted.
    fn encode_fields<S: Sink>(&mut self, record: &Record, sink: &mut S) -> Result<()> {
        sink.write_length(record.defined_len());
        for (key, value) in record.defined() {
            sink.write_str(key);
            self.encode(value, sink)?;
        }
        Ok(())
    }

    fn encode_records<S: Sink>(&mut self, records: &RecordArray, sink: &mut S) -> Result<()> {
        if records.keys.is_empty() && !records.rows.is_empty() {
            return Err(RserError::unsupported(
                "templated object array",
                "rows without keys",
            ));
        }
        if let Some(row) = records.rows.iter().find(|r| r.len() != records.keys.len()) {
            return Err(RserError::unsupported(
                "templated object array",
                format!(
                    "row has {} values for {} keys",
                    row.len(),
                    records.keys.len()
                ),
            ));
        }

        sink.write_tag(Tag::TemplatedObjectArray);
        sink.write_length(records.keys.len());
        for key in &records.keys {
            sink.write_str(key);
        }
        sink.write_length(records.rows.len());
        for row in &records.rows {
            for value in row {
                self.encode(value, sink)?;
            }
        }
        Ok(())
    }

    fn encode_map<S: Sink>(&mut self, map: &MapValue, sink: &mut S) -> Result<()> {
        sink.write_tag(Tag::Map);
        sink.write_length(map.len());
        for (k, v) in map.iter() {
            self.encode(k, sink)?;
            self.encode(v, sink)?;
        }
        Ok(())
    }

    fn encode_set<S: Sink>(&mut self, set: &SetValue, sink: &mut S) -> Result<()> {
        sink.write_tag(Tag::Set);
        sink.write_length(set.len());
        for item in set.iter() {
            self.encode(item, sink)?;
        }
        Ok(())
    }

    fn encode_error<S: Sink>(&mut self, err: &ErrorValue, sink: &mut S) -> Result<()> {
        sink.write_tag(Tag::Error);
        sink.write_byte(err.kind.code());
        sink.write_str(&err.message);
        write_optional_string(err.stack.as_deref(), sink);
        self.encode_fields(&err.properties, sink)?;
        sink.write_length(err.frames.len());
        for frame in &err.frames {
            write_frame(frame, sink);
        }
        Ok(())
    }

    fn encode_paths<S: Sink>(&mut self, paths: &PathCollection, sink: &mut S) -> Result<()> {
        for item in &paths.items {
            PathCollection::check_item(paths.flavor, item)
                .map_err(|reason| RserError::unsupported("path collection", reason))?;
        }
        sink.write_tag(Tag::PathCollection);
        sink.write_byte(paths.flavor.code());
        self.encode_seq(paths.items.iter(), sink)
    }
}

fn write_optional_string<S: Sink>(s: Option<&str>, sink: &mut S) {
    match s {
        Some(s) => {
            sink.write_tag(Tag::String);
            sink.write_str(s);
        }
        None => sink.write_tag(Tag::Undefined),
    }
}

fn write_frame<S: Sink>(frame: &StackFrame, sink: &mut S) {
    write_optional_string(frame.function_name.as_deref(), sink);
    write_optional_string(frame.file_name.as_deref(), sink);
    sink.write_length(frame.line as usize);
    sink.write_length(frame.column as usize);
}

fn encode_binary<S: Sink>(binary: &BinaryValue, sink: &mut S) -> Result<()> {
    match binary {
        BinaryValue::Buffer(bytes) => {
            sink.write_tag(Tag::ArrayBuffer);
            sink.write_length(bytes.len());
            sink.write_bytes(bytes);
        }
        BinaryValue::View { kind, bytes } => {
            if bytes.len() % kind.element_size() != 0 {
                return Err(RserError::unsupported(
                    "typed array",
                    format!(
                        "{} bytes is not a multiple of the {}-byte element size",
                        bytes.len(),
                        kind.element_size()
                    ),
                ));
            }
            sink.write_tag(Tag::TypedArray);
            sink.write_byte(kind.code());
            sink.write_length(bytes.len());
            sink.write_bytes(bytes);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Exact encoded size of `value`.
pub fn measure_value(value: &Value) -> Result<usize> {
    Encoder::new().measure(value)
}

/// Encode one value as a bare (unframed) payload.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    let len = encoder.measure(value)?;
    let mut buf = vec![0u8; len];
    encoder.write_measured(value, len, &mut buf)?;
    trace!("encoded {} ({len} bytes)", value.kind_name());
    Ok(buf)
}

/// Encode one value as a framed message: MESSAGE_HEADER(len) + payload.
pub fn encode_message(value: &Value) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    let len = encoder.measure(value)?;
    let header_len = header::message_header_len(len);
    let mut buf = vec![0u8; header_len + len];
    let mut writer = SliceWriter::new(&mut buf);
    header::write_message_header(&mut writer, len);
    encoder.encode(value, &mut writer)?;
    debug_assert_eq!(writer.position(), header_len + len);
    trace!("framed {} ({header_len}+{len} bytes)", value.kind_name());
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
