// RSER decoder: tag-dispatched reconstruction from a byte slice.
//
// Every read is bounds-checked and every tag byte goes through the code
// table, so malformed input produces an error carrying the offending offset
// rather than a panic.  Counts are checked against the remaining input
// before anything is allocated for them.

use std::rc::Rc;

use super::code_table::{self, Tag};
use super::key_cache::KeyCache;
use super::reference::DecodeRefs;
use super::sink::MAX_SAFE_INTEGER;
use crate::error::{Result, RserError};
use crate::value::{
    BinaryValue, ErrorKind, ErrorValue, MapValue, PathCollection, PathFlavor, PathValue, Record,
    RecordArray, RegExpFlags, RegExpValue, SetValue, Shared, StackFrame, Value, ViewKind, shared,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Limits applied while decoding untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Maximum nesting depth of values.
    pub max_depth: usize,
    /// Largest accepted length, count or id.
    pub max_length: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: 512,
            max_length: MAX_SAFE_INTEGER as usize,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Cursor over one encoded buffer.
pub struct Decoder<'a, 'c> {
    data: &'a [u8],
    pos: usize,
    refs: DecodeRefs,
    key_cache: Option<&'c mut KeyCache>,
    options: DecodeOptions,
    depth: usize,
}

impl<'a, 'c> Decoder<'a, 'c> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, DecodeOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: DecodeOptions) -> Self {
        Self {
            data,
            pos: 0,
            refs: DecodeRefs::new(),
            key_cache: None,
            options,
            depth: 0,
        }
    }

    /// Route object keys through `cache`.
    pub fn with_key_cache(mut self, cache: &'c mut KeyCache) -> Self {
        self.key_cache = Some(cache);
        self
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    // -- raw reads ----------------------------------------------------------

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(RserError::Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Tag at the cursor without consuming it.
    pub fn peek_tag(&self) -> Result<Tag> {
        match self.data.get(self.pos) {
            Some(&byte) => code_table::validate(byte, self.pos),
            None => Err(RserError::Truncated {
                offset: self.pos,
                needed: 1,
                available: 0,
            }),
        }
    }

    pub fn read_tag(&mut self) -> Result<Tag> {
        let tag = self.peek_tag()?;
        self.pos += 1;
        Ok(tag)
    }

    /// Payload of a numeric tag that has already been consumed.
    fn read_number_body(&mut self, tag: Tag) -> Result<Value> {
        Ok(match tag {
            Tag::PositiveZero => Value::Number(0.0),
            Tag::PositiveOne => Value::Number(1.0),
            Tag::NegativeOne => Value::Number(-1.0),
            Tag::NegativeZero => Value::Number(-0.0),
            Tag::NaN => Value::Number(f64::NAN),
            Tag::PositiveInfinity => Value::Number(f64::INFINITY),
            Tag::NegativeInfinity => Value::Number(f64::NEG_INFINITY),
            Tag::Int8 => Value::Number(f64::from(i8::from_be_bytes(self.read_array()?))),
            Tag::Int16 => Value::Number(f64::from(i16::from_be_bytes(self.read_array()?))),
            Tag::Int32 => Value::Number(f64::from(i32::from_be_bytes(self.read_array()?))),
            Tag::Int64 => Value::BigInt(i64::from_be_bytes(self.read_array()?)),
            Tag::Float => Value::Number(f64::from_be_bytes(self.read_array()?)),
            other => {
                return Err(RserError::UnexpectedTag {
                    offset: self.pos - 1,
                    found: other,
                    expected: "number",
                });
            }
        })
    }

    /// A non-negative encoded integer (length, count, id or version).
    pub fn read_uint(&mut self) -> Result<u64> {
        let offset = self.pos;
        let tag = self.read_tag()?;
        if !tag.is_number() {
            return Err(RserError::UnexpectedTag {
                offset,
                found: tag,
                expected: "integer",
            });
        }
        let n = match self.read_number_body(tag)? {
            Value::BigInt(i) => u64::try_from(i)
                .map_err(|_| RserError::malformed(offset, format!("negative length {i}")))?,
            Value::Number(f) => {
                if !(f.is_finite() && f.fract() == 0.0 && f >= 0.0 && f <= MAX_SAFE_INTEGER as f64)
                {
                    return Err(RserError::malformed(
                        offset,
                        format!("{f} is not a valid length"),
                    ));
                }
                f as u64
            }
            _ => unreachable!("numeric tags decode to numbers"),
        };
        if n > self.options.max_length as u64 {
            return Err(RserError::malformed(
                offset,
                format!("length {n} exceeds limit {}", self.options.max_length),
            ));
        }
        Ok(n)
    }

    fn read_count(&mut self) -> Result<usize> {
        let offset = self.pos;
        let n = self.read_uint()?;
        usize::try_from(n).map_err(|_| RserError::malformed(offset, "length overflows usize"))
    }

    /// Fail before allocating if `count` items of at least `min_size`
    /// bytes each cannot fit in the remaining input.
    fn ensure_items(&self, count: usize, min_size: usize) -> Result<()> {
        let needed = count.saturating_mul(min_size);
        if needed > self.remaining() {
            return Err(RserError::Truncated {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    /// Length-prefixed UTF-8 (no tag byte).
    pub fn read_str(&mut self) -> Result<&'a str> {
        let len = self.read_count()?;
        let offset = self.pos;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|e| RserError::malformed(offset, e.to_string()))
    }

    /// Length-prefixed object key, through the key cache when attached.
    pub fn read_key(&mut self) -> Result<String> {
        let len = self.read_count()?;
        let offset = self.pos;
        let bytes = self.read_bytes(len)?;
        let decoded = match self.key_cache.as_deref_mut() {
            Some(cache) => cache.decode(bytes),
            None => std::str::from_utf8(bytes).map(str::to_owned),
        };
        decoded.map_err(|e| RserError::malformed(offset, e.to_string()))
    }

    // -- values -------------------------------------------------------------

    /// Decode one value at the cursor.
    pub fn decode_value(&mut self) -> Result<Value> {
        if self.depth >= self.options.max_depth {
            return Err(RserError::DepthLimit {
                offset: self.pos,
                limit: self.options.max_depth,
            });
        }
        self.depth += 1;
        let result = self.decode_tagged();
        self.depth -= 1;
        result
    }

    fn decode_tagged(&mut self) -> Result<Value> {
        let offset = self.pos;
        let tag = self.read_tag()?;
        match tag {
            Tag::Undefined => Ok(Value::Undefined),
            Tag::Null => Ok(Value::Null),
            Tag::True => Ok(Value::Bool(true)),
            Tag::False => Ok(Value::Bool(false)),
            t if t.is_number() => self.read_number_body(t),
            Tag::String => Ok(Value::String(self.read_str()?.to_owned())),
            Tag::Symbol => Ok(Value::Symbol(self.read_str()?.to_owned())),
            Tag::Date => self.read_date(),
            Tag::RegExp => self.read_regexp(),
            Tag::Error => self.read_error(),
            Tag::ArrayBuffer => {
                let len = self.read_count()?;
                Ok(Value::Binary(BinaryValue::Buffer(self.read_bytes(len)?.to_vec())))
            }
            Tag::TypedArray => self.read_typed_array(),
            Tag::Path => {
                let flavor = self.read_flavor()?;
                let path = self.read_str()?.to_owned();
                Ok(Value::Path(PathValue { flavor, path }))
            }
            Tag::Reference => {
                let id = self.read_uint()?;
                self.refs.resolve(id, offset)
            }
            Tag::DeclareReference => {
                let id = self.read_uint()?;
                self.decode_declared(id)
            }
            Tag::StreamHeader | Tag::MessageHeader => Err(RserError::UnexpectedTag {
                offset,
                found: tag,
                expected: "value",
            }),
            _ => self.decode_referenceable(tag, None),
        }
    }

    /// Body of a DECLARE_REFERENCE: a referenceable value registered under
    /// `id` before its children are decoded.
    fn decode_declared(&mut self, id: u64) -> Result<Value> {
        let offset = self.pos;
        let tag = self.read_tag()?;
        if !tag.is_referenceable() {
            return Err(RserError::UnexpectedTag {
                offset,
                found: tag,
                expected: "referenceable value",
            });
        }
        self.decode_referenceable(tag, Some((id, offset)))
    }

    /// Decode a referenceable kind.  With `declare`, the empty container is
    /// registered first so nested REFERENCEs resolve to it.
    fn decode_referenceable(&mut self, tag: Tag, declare: Option<(u64, usize)>) -> Result<Value> {
        let value = match tag {
            Tag::String => {
                let s = self.read_str()?;
                if declare.is_none() {
                    return Ok(Value::String(s.to_owned()));
                }
                Value::SharedString(Rc::from(s))
            }
            Tag::Array => Value::Array(shared(Vec::new())),
            Tag::TemplatedObjectArray => Value::Records(shared(RecordArray::default())),
            Tag::Map => Value::Map(shared(MapValue::new())),
            Tag::Set => Value::Set(shared(SetValue::new())),
            Tag::Object => Value::Object(shared(Record::new())),
            Tag::PathCollection => {
                let flavor = self.read_flavor()?;
                Value::PathCollection(shared(PathCollection::new(flavor)))
            }
            other => unreachable!("{other} is not referenceable"),
        };

        if let Some((id, offset)) = declare {
            self.refs.register(id, value.clone(), offset)?;
        }

        match &value {
            Value::Array(rc) => self.fill_array(rc)?,
            Value::Records(rc) => self.fill_records(rc)?,
            Value::Map(rc) => self.fill_map(rc)?,
            Value::Set(rc) => self.fill_set(rc)?,
            Value::Object(rc) => {
                let record = self.read_fields()?;
                *rc.borrow_mut() = record;
            }
            Value::PathCollection(rc) => self.fill_paths(rc)?,
            _ => {}
        }
        Ok(value)
    }

    fn fill_array(&mut self, rc: &Shared<Vec<Value>>) -> Result<()> {
        let count = self.read_count()?;
        self.ensure_items(count, 1)?;
        rc.borrow_mut().reserve(count);
        for _ in 0..count {
            let item = self.decode_value()?;
            rc.borrow_mut().push(item);
        }
        Ok(())
    }

    fn fill_records(&mut self, rc: &Shared<RecordArray>) -> Result<()> {
        let key_count = self.read_count()?;
        self.ensure_items(key_count, 1)?;
        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            keys.push(self.read_key()?);
        }
        let offset = self.pos;
        let row_count = self.read_count()?;
        if key_count == 0 && row_count > 0 {
            return Err(RserError::malformed(offset, "templated rows without keys"));
        }
        self.ensure_items(row_count, key_count)?;
        rc.borrow_mut().keys = keys;
        for _ in 0..row_count {
            let mut row = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                row.push(self.decode_value()?);
            }
            rc.borrow_mut().rows.push(row);
        }
        Ok(())
    }

    // Maps and sets are built locally and stored once complete, so no
    // borrow of the container is held while its members decode.

    fn fill_map(&mut self, rc: &Shared<MapValue>) -> Result<()> {
        let count = self.read_count()?;
        self.ensure_items(count, 2)?;
        let mut map = MapValue::with_capacity(count);
        for _ in 0..count {
            let offset = self.pos;
            let key = self.decode_value()?;
            let value = self.decode_value()?;
            if map.insert(key, value).is_some() {
                return Err(RserError::malformed(offset, "duplicate map key"));
            }
        }
        *rc.borrow_mut() = map;
        Ok(())
    }

    fn fill_set(&mut self, rc: &Shared<SetValue>) -> Result<()> {
        let count = self.read_count()?;
        self.ensure_items(count, 1)?;
        let mut set = SetValue::with_capacity(count);
        for _ in 0..count {
            let offset = self.pos;
            if !set.insert(self.decode_value()?) {
                return Err(RserError::malformed(offset, "duplicate set member"));
            }
        }
        *rc.borrow_mut() = set;
        Ok(())
    }

    fn fill_paths(&mut self, rc: &Shared<PathCollection>) -> Result<()> {
        let count = self.read_count()?;
        self.ensure_items(count, 1)?;
        let flavor = rc.borrow().flavor;
        for _ in 0..count {
            let offset = self.pos;
            let item = self.decode_value()?;
            if let Err(reason) = PathCollection::check_item(flavor, &item) {
                return Err(RserError::malformed(offset, reason));
            }
            rc.borrow_mut().items.push(item);
        }
        Ok(())
    }

    /// Count + key/value pairs.
    fn read_fields(&mut self) -> Result<Record> {
        let count = self.read_count()?;
        self.ensure_items(count, 2)?;
        let mut record = Record::with_capacity(count);
        for _ in 0..count {
            let key = self.read_key()?;
            let value = self.decode_value()?;
            record.insert(key, value);
        }
        Ok(record)
    }

    fn read_date(&mut self) -> Result<Value> {
        let offset = self.pos;
        let tag = self.read_tag()?;
        let ms = match self.read_number_body(tag) {
            Ok(Value::BigInt(i)) => Some(i),
            Ok(Value::Number(f)) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            Ok(_) => None,
            Err(RserError::UnexpectedTag { found, .. }) => {
                return Err(RserError::UnexpectedTag {
                    offset,
                    found,
                    expected: "date timestamp",
                });
            }
            Err(e) => return Err(e),
        };
        match ms {
            Some(ms) if ms.unsigned_abs() <= MAX_SAFE_INTEGER as u64 => Ok(Value::Date(ms)),
            _ => Err(RserError::malformed(offset, "date timestamp out of range")),
        }
    }

    fn read_regexp(&mut self) -> Result<Value> {
        let source = self.read_str()?.to_owned();
        let offset = self.pos;
        let flags = RegExpFlags::parse(self.read_str()?)
            .map_err(|c| RserError::malformed(offset, format!("bad regexp flag {c:?}")))?;
        Ok(Value::RegExp(RegExpValue { source, flags }))
    }

    fn read_optional_string(&mut self) -> Result<Option<String>> {
        let offset = self.pos;
        match self.read_tag()? {
            Tag::Undefined => Ok(None),
            Tag::String => Ok(Some(self.read_str()?.to_owned())),
            found => Err(RserError::UnexpectedTag {
                offset,
                found,
                expected: "string or undefined",
            }),
        }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let offset = self.pos;
        let n = self.read_uint()?;
        u32::try_from(n).map_err(|_| RserError::malformed(offset, format!("{n} overflows u32")))
    }

    fn read_error(&mut self) -> Result<Value> {
        let offset = self.pos;
        let code = self.read_u8()?;
        let kind =
            ErrorKind::from_code(code).ok_or(RserError::InvalidTag { offset, byte: code })?;
        let message = self.read_str()?.to_owned();
        let stack = self.read_optional_string()?;
        let properties = self.read_fields()?;

        let frame_count = self.read_count()?;
        self.ensure_items(frame_count, 4)?;
        let mut frames = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            frames.push(StackFrame {
                function_name: self.read_optional_string()?,
                file_name: self.read_optional_string()?,
                line: self.read_u32()?,
                column: self.read_u32()?,
            });
        }

        Ok(Value::Error(Box::new(ErrorValue {
            kind,
            message,
            stack,
            properties,
            frames,
        })))
    }

    fn read_typed_array(&mut self) -> Result<Value> {
        let offset = self.pos;
        let code = self.read_u8()?;
        let kind = ViewKind::from_code(code).ok_or(RserError::InvalidTag { offset, byte: code })?;
        let len_offset = self.pos;
        let len = self.read_count()?;
        if len % kind.element_size() != 0 {
            return Err(RserError::malformed(
                len_offset,
                format!(
                    "byte length {len} is not a multiple of {}",
                    kind.element_size()
                ),
            ));
        }
        let bytes = self.read_bytes(len)?.to_vec();
        Ok(Value::Binary(BinaryValue::View { kind, bytes }))
    }

    fn read_flavor(&mut self) -> Result<PathFlavor> {
        let offset = self.pos;
        let code = self.read_u8()?;
        PathFlavor::from_code(code).ok_or(RserError::InvalidTag { offset, byte: code })
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Decode a bare payload holding exactly one value.
pub fn decode_value(data: &[u8]) -> Result<Value> {
    decode_value_with(data, &DecodeOptions::default(), None)
}

/// Decode a bare payload with explicit limits and an optional key cache.
/// Trailing bytes after the value are an error.
pub fn decode_value_with(
    data: &[u8],
    options: &DecodeOptions,
    key_cache: Option<&mut KeyCache>,
) -> Result<Value> {
    let mut decoder = Decoder::with_options(data, *options);
    if let Some(cache) = key_cache {
        decoder = decoder.with_key_cache(cache);
    }
    let value = decoder.decode_value()?;
    if !decoder.is_empty() {
        return Err(RserError::malformed(
            decoder.position(),
            format!("{} trailing bytes", decoder.remaining()),
        ));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
