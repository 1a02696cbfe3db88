// RSER code table: one tag byte per value kind.
//
// Tag byte values are part of the wire contract for a protocol version and
// must never be reassigned.  Bytes not listed here are rejected on decode.

use std::fmt;

use crate::error::{Result, RserError};

/// A tag byte identifying the kind of the next encoded unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Undefined = 0x00,
    Null = 0x01,
    True = 0x02,
    False = 0x03,
    PositiveZero = 0x04,
    PositiveOne = 0x05,
    NegativeOne = 0x06,
    Int8 = 0x07,
    Int16 = 0x08,
    Int32 = 0x09,
    Int64 = 0x0A,
    Float = 0x0B,
    NaN = 0x0C,
    PositiveInfinity = 0x0D,
    NegativeInfinity = 0x0E,
    NegativeZero = 0x0F,
    String = 0x10,
    Symbol = 0x11,
    Date = 0x12,
    RegExp = 0x13,
    Array = 0x14,
    TemplatedObjectArray = 0x15,
    Map = 0x16,
    Set = 0x17,
    Object = 0x18,
    Error = 0x19,
    ArrayBuffer = 0x1A,
    TypedArray = 0x1B,
    Path = 0x1C,
    PathCollection = 0x1D,
    Reference = 0x1E,
    DeclareReference = 0x1F,
    StreamHeader = 0x20,
    MessageHeader = 0x21,
}

/// Every tag, in byte order.
pub const ALL_TAGS: [Tag; 34] = [
    Tag::Undefined,
    Tag::Null,
    Tag::True,
    Tag::False,
    Tag::PositiveZero,
    Tag::PositiveOne,
    Tag::NegativeOne,
    Tag::Int8,
    Tag::Int16,
    Tag::Int32,
    Tag::Int64,
    Tag::Float,
    Tag::NaN,
    Tag::PositiveInfinity,
    Tag::NegativeInfinity,
    Tag::NegativeZero,
    Tag::String,
    Tag::Symbol,
    Tag::Date,
    Tag::RegExp,
    Tag::Array,
    Tag::TemplatedObjectArray,
    Tag::Map,
    Tag::Set,
    Tag::Object,
    Tag::Error,
    Tag::ArrayBuffer,
    Tag::TypedArray,
    Tag::Path,
    Tag::PathCollection,
    Tag::Reference,
    Tag::DeclareReference,
    Tag::StreamHeader,
    Tag::MessageHeader,
];

/// The 256-entry byte → tag table.
pub type CodeTable = [Option<Tag>; 256];

/// Build the code table from `ALL_TAGS`.
pub fn build_code_table() -> CodeTable {
    let mut tbl = [None; 256];
    for tag in ALL_TAGS {
        debug_assert!(tbl[tag as usize].is_none(), "tag byte reused: {tag}");
        tbl[tag as usize] = Some(tag);
    }
    tbl
}

/// Return a reference to the lazily-initialized code table.
pub fn code_table() -> &'static CodeTable {
    use std::sync::LazyLock;
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build_code_table);
    &TABLE
}

/// Look up a raw byte read from untrusted input.
#[inline]
pub fn lookup(byte: u8) -> Option<Tag> {
    code_table()[byte as usize]
}

/// Validate a tag byte found at `offset`.
#[inline]
pub fn validate(byte: u8, offset: usize) -> Result<Tag> {
    lookup(byte).ok_or(RserError::InvalidTag { offset, byte })
}

impl Tag {
    #[inline]
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Tags that start an encoded number.
    pub fn is_number(self) -> bool {
        matches!(
            self,
            Tag::PositiveZero
                | Tag::PositiveOne
                | Tag::NegativeOne
                | Tag::Int8
                | Tag::Int16
                | Tag::Int32
                | Tag::Int64
                | Tag::Float
                | Tag::NaN
                | Tag::PositiveInfinity
                | Tag::NegativeInfinity
                | Tag::NegativeZero
        )
    }

    /// Payload bytes following a numeric tag, or `None` for non-numeric tags.
    pub fn number_payload_len(self) -> Option<usize> {
        match self {
            Tag::PositiveZero
            | Tag::PositiveOne
            | Tag::NegativeOne
            | Tag::NaN
            | Tag::PositiveInfinity
            | Tag::NegativeInfinity
            | Tag::NegativeZero => Some(0),
            Tag::Int8 => Some(1),
            Tag::Int16 => Some(2),
            Tag::Int32 => Some(4),
            Tag::Int64 | Tag::Float => Some(8),
            _ => None,
        }
    }

    /// Kinds that may follow a DECLARE_REFERENCE.
    pub fn is_referenceable(self) -> bool {
        matches!(
            self,
            Tag::Array
                | Tag::TemplatedObjectArray
                | Tag::Map
                | Tag::Set
                | Tag::Object
                | Tag::PathCollection
                | Tag::String
        )
    }

    /// Framing tokens are only valid at message boundaries.
    pub fn is_framing(self) -> bool {
        matches!(self, Tag::StreamHeader | Tag::MessageHeader)
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Undefined => "UNDEFINED",
            Tag::Null => "NULL",
            Tag::True => "TRUE",
            Tag::False => "FALSE",
            Tag::PositiveZero => "POSITIVE_ZERO",
            Tag::PositiveOne => "POSITIVE_ONE",
            Tag::NegativeOne => "NEGATIVE_ONE",
            Tag::Int8 => "INT8",
            Tag::Int16 => "INT16",
            Tag::Int32 => "INT32",
            Tag::Int64 => "INT64",
            Tag::Float => "FLOAT",
            Tag::NaN => "NAN",
            Tag::PositiveInfinity => "POSITIVE_INFINITY",
            Tag::NegativeInfinity => "NEGATIVE_INFINITY",
            Tag::NegativeZero => "NEGATIVE_ZERO",
            Tag::String => "STRING",
            Tag::Symbol => "SYMBOL",
            Tag::Date => "DATE",
            Tag::RegExp => "REGEXP",
            Tag::Array => "ARRAY",
            Tag::TemplatedObjectArray => "TEMPLATED_OBJECT_ARRAY",
            Tag::Map => "MAP",
            Tag::Set => "SET",
            Tag::Object => "OBJECT",
            Tag::Error => "ERROR",
            Tag::ArrayBuffer => "ARRAY_BUFFER",
            Tag::TypedArray => "TYPED_ARRAY",
            Tag::Path => "PATH",
            Tag::PathCollection => "PATH_COLLECTION",
            Tag::Reference => "REFERENCE",
            Tag::DeclareReference => "DECLARE_REFERENCE",
            Tag::StreamHeader => "STREAM_HEADER",
            Tag::MessageHeader => "MESSAGE_HEADER",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Tag {
    type Error = u8;

    fn try_from(byte: u8) -> std::result::Result<Self, u8> {
        lookup(byte).ok_or(byte)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
