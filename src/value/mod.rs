// RSER value model.
//
// `Value` is the closed set of kinds the codec can represent.  Composite
// kinds are `Rc<RefCell<_>>` handles so that sharing and cycles survive a
// round-trip: two slots holding the same handle encode once and decode back
// into two slots holding one handle.
//
// # Modules
//
// - `collections` — Record, MapValue, SetValue, RecordArray
// - `domain`      — errors, binary views, paths, regexps

pub mod collections;
pub mod domain;

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

pub use collections::{MapValue, Record, RecordArray, SetValue};
use collections::ZeroKey;
pub use domain::{
    BinaryValue, ErrorKind, ErrorValue, PathCollection, PathFlavor, PathValue, RegExpFlags,
    RegExpValue, StackFrame, ViewKind,
};

/// A shared, interior-mutable handle to a composite.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a composite in a fresh shared handle.
#[inline]
pub fn shared<T>(inner: T) -> Shared<T> {
    Rc::new(RefCell::new(inner))
}

/// Any value RSER can carry.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    /// IEEE-754 double; integral values in i32 range are packed as integers.
    Number(f64),
    /// Explicit 64-bit integer; always encoded as INT64.
    BigInt(i64),
    String(String),
    /// A string marked reusable: repeated handles are written once.
    SharedString(Rc<str>),
    /// Interned symbol, identified by its key.
    Symbol(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    RegExp(RegExpValue),
    Array(Shared<Vec<Value>>),
    /// Array of same-shaped records sharing one key list.
    Records(Shared<RecordArray>),
    Map(Shared<MapValue>),
    Set(Shared<SetValue>),
    Object(Shared<Record>),
    Error(Box<ErrorValue>),
    Binary(BinaryValue),
    Path(PathValue),
    PathCollection(Shared<PathCollection>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(shared(items))
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(shared(fields.into_iter().collect()))
    }

    pub fn map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Value, Value)>,
    {
        Value::Map(shared(entries.into_iter().collect()))
    }

    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Set(shared(items.into_iter().collect()))
    }

    pub fn records(records: RecordArray) -> Self {
        Value::Records(shared(records))
    }

    pub fn path_collection(collection: PathCollection) -> Self {
        Value::PathCollection(shared(collection))
    }

    pub fn shared_string(s: &str) -> Self {
        Value::SharedString(Rc::from(s))
    }

    /// Short kind name used in error messages and the CLI.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) | Value::SharedString(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Date(_) => "date",
            Value::RegExp(_) => "regexp",
            Value::Array(_) => "array",
            Value::Records(_) => "templated object array",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Object(_) => "object",
            Value::Error(_) => "error",
            Value::Binary(BinaryValue::Buffer(_)) => "array buffer",
            Value::Binary(BinaryValue::View { .. }) => "typed array",
            Value::Path(_) => "path",
            Value::PathCollection(_) => "path collection",
        }
    }

    /// Address of the shared allocation for referenceable values.
    ///
    /// Two values with the same identity are the same object; the encoder
    /// writes such a value once and refers back to it afterwards.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::SharedString(s) => Some(Rc::as_ptr(s) as *const u8 as usize),
            Value::Array(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            Value::Records(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            Value::Map(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            Value::Set(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            Value::Object(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            Value::PathCollection(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            _ => None,
        }
    }

    /// True if both values are the same shared object.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::SharedString(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<Shared<Vec<Value>>> {
        match self {
            Value::Array(rc) => Some(Rc::clone(rc)),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<Shared<Record>> {
        match self {
            Value::Object(rc) => Some(Rc::clone(rc)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<Shared<MapValue>> {
        match self {
            Value::Map(rc) => Some(Rc::clone(rc)),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<Shared<SetValue>> {
        match self {
            Value::Set(rc) => Some(Rc::clone(rc)),
            _ => None,
        }
    }

    /// Map/set key equality (SameValueZero): NaN equals NaN, +0 equals -0,
    /// composites and errors compare by identity, everything else by value.
    ///
    /// Never borrows a composite, so it is safe while one is being filled.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        ZeroKey::of(self) == ZeroKey::of(other)
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(shared(record))
    }
}

impl From<ErrorValue> for Value {
    fn from(err: ErrorValue) -> Self {
        Value::Error(Box::new(err))
    }
}

impl From<BinaryValue> for Value {
    fn from(bin: BinaryValue) -> Self {
        Value::Binary(bin)
    }
}

impl From<PathValue> for Value {
    fn from(path: PathValue) -> Self {
        Value::Path(path)
    }
}

// ---------------------------------------------------------------------------
// Structural equality
//
// Co-inductive over pointer pairs: a pair of composites already being
// compared higher up the stack is assumed equal, which makes equality of
// two isomorphic cyclic graphs terminate with `true`.
// ---------------------------------------------------------------------------

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        structural_eq(self, other, &mut HashSet::new())
    }
}

fn structural_eq(a: &Value, b: &Value, active: &mut HashSet<(usize, usize)>) -> bool {
    if let (Some(pa), Some(pb)) = (a.identity(), b.identity()) {
        if pa == pb {
            return true;
        }
        if !active.insert((pa, pb)) {
            return true;
        }
    }

    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan())
        }
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (
            Value::String(_) | Value::SharedString(_),
            Value::String(_) | Value::SharedString(_),
        ) => a.as_str() == b.as_str(),
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::RegExp(x), Value::RegExp(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            slices_eq(&x.borrow(), &y.borrow(), active)
        }
        (Value::Records(x), Value::Records(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.keys == y.keys
                && x.rows.len() == y.rows.len()
                && x.rows
                    .iter()
                    .zip(&y.rows)
                    .all(|(rx, ry)| slices_eq(rx, ry, active))
        }
        (Value::Map(x), Value::Map(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().zip(y.iter()).all(|((kx, vx), (ky, vy))| {
                    structural_eq(kx, ky, active) && structural_eq(vx, vy, active)
                })
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|(ix, iy)| structural_eq(ix, iy, active))
        }
        (Value::Object(x), Value::Object(y)) => records_eq(&x.borrow(), &y.borrow(), active),
        (Value::Error(x), Value::Error(y)) => {
            x.kind == y.kind
                && x.message == y.message
                && x.stack == y.stack
                && x.frames == y.frames
                && records_eq(&x.properties, &y.properties, active)
        }
        (Value::Binary(x), Value::Binary(y)) => x == y,
        (Value::Path(x), Value::Path(y)) => x == y,
        (Value::PathCollection(x), Value::PathCollection(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.flavor == y.flavor && slices_eq(&x.items, &y.items, active)
        }
        _ => false,
    }
}

fn slices_eq(x: &[Value], y: &[Value], active: &mut HashSet<(usize, usize)>) -> bool {
    x.len() == y.len() && x.iter().zip(y).all(|(a, b)| structural_eq(a, b, active))
}

fn records_eq(x: &Record, y: &Record, active: &mut HashSet<(usize, usize)>) -> bool {
    x.len() == y.len()
        && x
            .iter()
            .zip(y.iter())
            .all(|((kx, vx), (ky, vy))| kx == ky && structural_eq(vx, vy, active))
}

// ---------------------------------------------------------------------------
// Debug
// ---------------------------------------------------------------------------

thread_local! {
    // Composites currently being formatted on this thread.
    static FORMATTING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Format a composite unless it is already on the formatting stack.
fn fmt_guarded(
    id: usize,
    f: &mut fmt::Formatter<'_>,
    body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
) -> fmt::Result {
    if !FORMATTING.with(|set| set.borrow_mut().insert(id)) {
        return f.write_str("[Circular]");
    }
    let result = body(f);
    FORMATTING.with(|set| set.borrow_mut().remove(&id));
    result
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::BigInt(n) => write!(f, "{n}n"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::SharedString(s) => write!(f, "&{:?}", &**s),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Date(ms) => write!(f, "Date({ms})"),
            Value::RegExp(re) => write!(f, "/{}/{}", re.source, re.flags),
            Value::Error(e) => f
                .debug_struct("Error")
                .field("kind", &e.kind)
                .field("message", &e.message)
                .field("properties", &e.properties)
                .finish_non_exhaustive(),
            Value::Binary(bin) => write!(f, "{bin:?}"),
            Value::Path(p) => write!(f, "{p:?}"),
            Value::Array(rc) => fmt_guarded(self.id(), f, |f| {
                f.debug_list().entries(rc.borrow().iter()).finish()
            }),
            Value::Records(rc) => fmt_guarded(self.id(), f, |f| {
                let records = rc.borrow();
                f.debug_struct("Records")
                    .field("keys", &records.keys)
                    .field("rows", &records.rows)
                    .finish()
            }),
            Value::Map(rc) => fmt_guarded(self.id(), f, |f| {
                f.debug_map().entries(rc.borrow().iter().map(|(k, v)| (k, v))).finish()
            }),
            Value::Set(rc) => fmt_guarded(self.id(), f, |f| {
                f.debug_set().entries(rc.borrow().iter()).finish()
            }),
            Value::Object(rc) => fmt_guarded(self.id(), f, |f| {
                f.debug_map().entries(rc.borrow().iter()).finish()
            }),
            Value::PathCollection(rc) => fmt_guarded(self.id(), f, |f| {
                let coll = rc.borrow();
                f.debug_struct("PathCollection")
                    .field("flavor", &coll.flavor)
                    .field("items", &coll.items)
                    .finish()
            }),
        }
    }
}

impl Value {
    fn id(&self) -> usize {
        self.identity().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_by_bits_with_nan_equal() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(0.0), Value::Number(-0.0));
        assert_eq!(Value::Number(1.5), Value::from(1.5));
    }

    #[test]
    fn shared_string_equals_plain_string() {
        assert_eq!(Value::shared_string("key"), Value::from("key"));
        assert_ne!(Value::shared_string("key"), Value::from("other"));
    }

    #[test]
    fn identity_only_for_referenceable_kinds() {
        let arr = Value::array(vec![]);
        let alias = arr.clone();
        assert!(arr.ptr_eq(&alias));
        assert!(!arr.ptr_eq(&Value::array(vec![])));
        assert!(Value::Date(0).identity().is_none());
        assert!(Value::from("plain").identity().is_none());
    }

    #[test]
    fn cyclic_graphs_compare_and_format() {
        let make = || {
            let obj = Value::object(Vec::<(String, Value)>::new());
            let rc = obj.as_object().unwrap();
            rc.borrow_mut().insert("self", obj.clone());
            rc.borrow_mut().insert("n", Value::from(1));
            obj
        };
        let (a, b) = (make(), make());
        assert_eq!(a, b);
        assert!(format!("{a:?}").contains("[Circular]"));

        // break the cycles so the test does not leak
        a.as_object().unwrap().borrow_mut().remove("self");
        b.as_object().unwrap().borrow_mut().remove("self");
    }

    #[test]
    fn same_value_zero_rules() {
        assert!(Value::Number(0.0).same_value_zero(&Value::Number(-0.0)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        let a = Value::array(vec![]);
        let b = Value::array(vec![]);
        assert!(!a.same_value_zero(&b));
        assert!(a.same_value_zero(&a.clone()));
        assert!(Value::from("x").same_value_zero(&Value::shared_string("x")));
        assert!(!Value::Number(1.0).same_value_zero(&Value::BigInt(1)));
        assert!(Value::Date(7).same_value_zero(&Value::Date(7)));

        let err = Value::from(ErrorValue::new(ErrorKind::TypeError, "x"));
        assert!(err.same_value_zero(&err));
        assert!(!err.same_value_zero(&err.clone()));
    }

    #[test]
    fn kind_names() {
        assert_eq!(Value::Undefined.kind_name(), "undefined");
        assert_eq!(Value::BigInt(3).kind_name(), "bigint");
        assert_eq!(
            Value::Binary(BinaryValue::Buffer(vec![1])).kind_name(),
            "array buffer"
        );
    }
}
