// Byte sinks for the encoder.
//
// The encoder walks a value once per sink.  `SizeCounter` only accumulates
// a byte total; `SliceWriter` writes into an exactly-sized buffer.  Numeric
// and string encoding policy lives in the provided methods of `Sink`, so
// both passes agree on every byte.

use super::code_table::Tag;

/// Largest integer an f64 represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Destination for encoded bytes.
pub trait Sink {
    /// True for sinks that only count bytes.  The reference table tracks
    /// sightings during the measuring pass and replays them when writing.
    const MEASURING: bool = false;

    fn write_byte(&mut self, byte: u8);

    fn write_bytes(&mut self, bytes: &[u8]);

    /// Bytes produced (or counted) so far.
    fn position(&self) -> usize;

    #[inline]
    fn write_tag(&mut self, tag: Tag) {
        self.write_byte(tag.byte());
    }

    #[inline]
    fn write_i8(&mut self, v: i8) {
        self.write_byte(v as u8);
    }

    #[inline]
    fn write_i16(&mut self, v: i16) {
        self.write_bytes(&v.to_be_bytes());
    }

    #[inline]
    fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_be_bytes());
    }

    #[inline]
    fn write_i64(&mut self, v: i64) {
        self.write_bytes(&v.to_be_bytes());
    }

    #[inline]
    fn write_f64(&mut self, v: f64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Encoded integer, smallest form first: singletons, then INT8/16/32.
    fn write_int(&mut self, v: i32) {
        match v {
            0 => self.write_tag(Tag::PositiveZero),
            1 => self.write_tag(Tag::PositiveOne),
            -1 => self.write_tag(Tag::NegativeOne),
            _ => {
                if let Ok(b) = i8::try_from(v) {
                    self.write_tag(Tag::Int8);
                    self.write_i8(b);
                } else if let Ok(h) = i16::try_from(v) {
                    self.write_tag(Tag::Int16);
                    self.write_i16(h);
                } else {
                    self.write_tag(Tag::Int32);
                    self.write_i32(v);
                }
            }
        }
    }

    /// Encoded number.  Integral values in i32 range use `write_int`;
    /// non-finite values and negative zero get dedicated tags; everything
    /// else is an 8-byte float.
    fn write_number(&mut self, n: f64) {
        if n.is_nan() {
            self.write_tag(Tag::NaN);
        } else if n == f64::INFINITY {
            self.write_tag(Tag::PositiveInfinity);
        } else if n == f64::NEG_INFINITY {
            self.write_tag(Tag::NegativeInfinity);
        } else if n == 0.0 && n.is_sign_negative() {
            self.write_tag(Tag::NegativeZero);
        } else if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
            self.write_int(n as i32);
        } else {
            self.write_tag(Tag::Float);
            self.write_f64(n);
        }
    }

    /// Explicit 64-bit integer: always INT64.
    fn write_bigint(&mut self, v: i64) {
        self.write_tag(Tag::Int64);
        self.write_i64(v);
    }

    /// Non-negative count, length or id.
    fn write_length(&mut self, n: usize) {
        match i32::try_from(n) {
            Ok(v) => self.write_int(v),
            Err(_) => {
                self.write_tag(Tag::Float);
                self.write_f64(n as f64);
            }
        }
    }

    /// Length-prefixed UTF-8 without a tag byte (keys, regexp parts).
    fn write_str(&mut self, s: &str) {
        self.write_length(s.len());
        self.write_bytes(s.as_bytes());
    }
}

// ---------------------------------------------------------------------------
// Measuring sink
// ---------------------------------------------------------------------------

/// Counts bytes without writing them.
#[derive(Debug, Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Sink for SizeCounter {
    const MEASURING: bool = true;

    #[inline]
    fn write_byte(&mut self, _byte: u8) {
        self.len += 1;
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }

    #[inline]
    fn position(&self) -> usize {
        self.len
    }
}

// ---------------------------------------------------------------------------
// Writing sink
// ---------------------------------------------------------------------------

/// Writes into a preallocated region sized by a measuring pass.
///
/// Writing past the end of the region panics: it means the two passes
/// disagreed, which is a bug in the encoder rather than bad input.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes of the region not yet written.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl Sink for SliceWriter<'_> {
    #[inline]
    fn write_byte(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    #[inline]
    fn position(&self) -> usize {
        self.pos
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
