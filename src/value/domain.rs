// Domain value types: structured errors, binary views, paths and regexps.
//
// Each type that is tagged by a sub-kind on the wire exposes a stable
// `code()` byte and a `from_code()` lookup.

use std::fmt;

use bitflags::bitflags;

use super::collections::Record;

// ---------------------------------------------------------------------------
// Structured errors
// ---------------------------------------------------------------------------

/// Error classification, written as a one-byte sub-tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    Error = 0,
    EvalError = 1,
    RangeError = 2,
    ReferenceError = 3,
    SyntaxError = 4,
    TypeError = 5,
    UriError = 6,
    AggregateError = 7,
}

impl ErrorKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Error,
            1 => Self::EvalError,
            2 => Self::RangeError,
            3 => Self::ReferenceError,
            4 => Self::SyntaxError,
            5 => Self::TypeError,
            6 => Self::UriError,
            7 => Self::AggregateError,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::EvalError => "EvalError",
            Self::RangeError => "RangeError",
            Self::ReferenceError => "ReferenceError",
            Self::SyntaxError => "SyntaxError",
            Self::TypeError => "TypeError",
            Self::UriError => "URIError",
            Self::AggregateError => "AggregateError",
        }
    }
}

/// One frame of a captured stack trace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: Option<String>,
    pub file_name: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// A structured error: kind, message, optional stack text, auxiliary
/// properties and parsed stack frames.
#[derive(Clone, Debug)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Option<String>,
    pub properties: Record,
    pub frames: Vec<StackFrame>,
}

impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: None,
            properties: Record::new(),
            frames: Vec::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_frame(mut self, frame: StackFrame) -> Self {
        self.frames.push(frame);
        self
    }
}

// ---------------------------------------------------------------------------
// Binary blobs and typed views
// ---------------------------------------------------------------------------

/// Element type of a typed view, written as a one-byte sub-tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ViewKind {
    Int8 = 0,
    Uint8 = 1,
    Uint8Clamped = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Float32 = 7,
    Float64 = 8,
    BigInt64 = 9,
    BigUint64 = 10,
    DataView = 11,
}

impl ViewKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Int8,
            1 => Self::Uint8,
            2 => Self::Uint8Clamped,
            3 => Self::Int16,
            4 => Self::Uint16,
            5 => Self::Int32,
            6 => Self::Uint32,
            7 => Self::Float32,
            8 => Self::Float64,
            9 => Self::BigInt64,
            10 => Self::BigUint64,
            11 => Self::DataView,
            _ => return None,
        })
    }

    /// Bytes per element; the byte length of a view must be a multiple.
    pub fn element_size(self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 | Self::Uint8Clamped | Self::DataView => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Float64 | Self::BigInt64 | Self::BigUint64 => 8,
        }
    }
}

/// A raw binary blob or a typed view over one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BinaryValue {
    Buffer(Vec<u8>),
    View { kind: ViewKind, bytes: Vec<u8> },
}

impl BinaryValue {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Buffer(b) | Self::View { bytes: b, .. } => b,
        }
    }

    pub fn view_kind(&self) -> Option<ViewKind> {
        match self {
            Self::Buffer(_) => None,
            Self::View { kind, .. } => Some(*kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Which flavor of path a path value or collection holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PathFlavor {
    Absolute = 0,
    Relative = 1,
    Url = 2,
    Uid = 3,
    Mixed = 4,
}

impl PathFlavor {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Absolute,
            1 => Self::Relative,
            2 => Self::Url,
            3 => Self::Uid,
            4 => Self::Mixed,
            _ => return None,
        })
    }
}

/// A single path in its serialized string form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathValue {
    pub flavor: PathFlavor,
    pub path: String,
}

impl PathValue {
    pub fn new(flavor: PathFlavor, path: impl Into<String>) -> Self {
        Self {
            flavor,
            path: path.into(),
        }
    }
}

/// An ordered collection of path values sharing a flavor.
///
/// Every item is a `Value::Path` of the collection's flavor; a `Mixed`
/// collection accepts paths of any flavor.
#[derive(Clone, Debug)]
pub struct PathCollection {
    pub flavor: PathFlavor,
    pub items: Vec<super::Value>,
}

impl PathCollection {
    pub fn new(flavor: PathFlavor) -> Self {
        Self {
            flavor,
            items: Vec::new(),
        }
    }

    /// Check that `item` may appear in a collection of `flavor`.
    pub fn check_item(flavor: PathFlavor, item: &super::Value) -> Result<(), String> {
        match item {
            super::Value::Path(path) if flavor == PathFlavor::Mixed || path.flavor == flavor => {
                Ok(())
            }
            super::Value::Path(path) => Err(format!(
                "{:?} path in a {flavor:?} path collection",
                path.flavor
            )),
            other => Err(format!("{} in a path collection", other.kind_name())),
        }
    }
}

// ---------------------------------------------------------------------------
// Regular expressions
// ---------------------------------------------------------------------------

bitflags! {
    /// RegExp flags; written as a string in canonical `dgimsuvy` order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RegExpFlags: u8 {
        const HAS_INDICES = 1 << 0;
        const GLOBAL = 1 << 1;
        const IGNORE_CASE = 1 << 2;
        const MULTILINE = 1 << 3;
        const DOT_ALL = 1 << 4;
        const UNICODE = 1 << 5;
        const UNICODE_SETS = 1 << 6;
        const STICKY = 1 << 7;
    }
}

const FLAG_CHARS: [(char, RegExpFlags); 8] = [
    ('d', RegExpFlags::HAS_INDICES),
    ('g', RegExpFlags::GLOBAL),
    ('i', RegExpFlags::IGNORE_CASE),
    ('m', RegExpFlags::MULTILINE),
    ('s', RegExpFlags::DOT_ALL),
    ('u', RegExpFlags::UNICODE),
    ('v', RegExpFlags::UNICODE_SETS),
    ('y', RegExpFlags::STICKY),
];

impl RegExpFlags {
    /// Parse a flag string; returns the offending character on failure.
    pub fn parse(s: &str) -> Result<Self, char> {
        let mut flags = Self::empty();
        for c in s.chars() {
            let flag = FLAG_CHARS
                .iter()
                .find(|(fc, _)| *fc == c)
                .map(|(_, f)| *f)
                .ok_or(c)?;
            if flags.contains(flag) {
                return Err(c);
            }
            flags |= flag;
        }
        Ok(flags)
    }
}

impl fmt::Display for RegExpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, flag) in FLAG_CHARS {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// A regular expression: pattern source plus flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegExpValue {
    pub source: String,
    pub flags: RegExpFlags,
}

impl RegExpValue {
    pub fn new(source: impl Into<String>, flags: RegExpFlags) -> Self {
        Self {
            source: source.into(),
            flags,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_tag_codes_roundtrip() {
        for code in 0..=7 {
            assert_eq!(ErrorKind::from_code(code).unwrap().code(), code);
        }
        assert!(ErrorKind::from_code(8).is_none());
        for code in 0..=11 {
            assert_eq!(ViewKind::from_code(code).unwrap().code(), code);
        }
        assert!(ViewKind::from_code(12).is_none());
        for code in 0..=4 {
            assert_eq!(PathFlavor::from_code(code).unwrap().code(), code);
        }
        assert!(PathFlavor::from_code(5).is_none());
    }

    #[test]
    fn regexp_flags_canonical_order() {
        let flags = RegExpFlags::parse("yig").unwrap();
        assert_eq!(flags.to_string(), "giy");
        assert_eq!(RegExpFlags::parse("").unwrap(), RegExpFlags::empty());
    }

    #[test]
    fn regexp_flags_reject_unknown_and_repeated() {
        assert_eq!(RegExpFlags::parse("gx"), Err('x'));
        assert_eq!(RegExpFlags::parse("gg"), Err('g'));
    }

    #[test]
    fn element_sizes() {
        assert_eq!(ViewKind::Uint8.element_size(), 1);
        assert_eq!(ViewKind::Int16.element_size(), 2);
        assert_eq!(ViewKind::Float32.element_size(), 4);
        assert_eq!(ViewKind::BigUint64.element_size(), 8);
    }

    #[test]
    fn path_collection_items_must_match_flavor() {
        use crate::value::Value;

        let url = Value::Path(PathValue::new(PathFlavor::Url, "https://a"));
        assert!(PathCollection::check_item(PathFlavor::Url, &url).is_ok());
        assert!(PathCollection::check_item(PathFlavor::Mixed, &url).is_ok());
        assert!(PathCollection::check_item(PathFlavor::Absolute, &url).is_err());
        assert!(PathCollection::check_item(PathFlavor::Mixed, &Value::from(1)).is_err());
    }

    #[test]
    fn error_builder() {
        let e = ErrorValue::new(ErrorKind::TypeError, "bad")
            .with_stack("TypeError: bad\n    at f")
            .with_frame(StackFrame {
                function_name: Some("f".into()),
                file_name: None,
                line: 3,
                column: 9,
            });
        assert_eq!(e.kind.name(), "TypeError");
        assert_eq!(e.frames.len(), 1);
    }
}
