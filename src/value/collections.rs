// Insertion-ordered collections backing the composite value kinds.
//
// All three are hash-indexed, so building one from n decoded entries is
// linear in n.

use indexmap::IndexMap;
use indexmap::map::Entry;

use super::Value;

// ---------------------------------------------------------------------------
// SameValueZero key
// ---------------------------------------------------------------------------

/// Hashable form of a value under SameValueZero.
///
/// Numbers hash by canonical bits (all NaNs alike, +0 and -0 alike).
/// Shared composites and errors are keyed by allocation address, so two
/// equal-looking objects stay distinct.  Dates, regexps, binary values and
/// paths are plain data in this model and key by content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ZeroKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    BigInt(i64),
    Str(Box<str>),
    Symbol(Box<str>),
    Date(i64),
    RegExp(Box<str>, u8),
    Binary(Option<u8>, Box<[u8]>),
    Path(u8, Box<str>),
    Identity(usize),
}

impl ZeroKey {
    pub(crate) fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => Self::Undefined,
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) if n.is_nan() => Self::Number(f64::NAN.to_bits()),
            Value::Number(n) if *n == 0.0 => Self::Number(0),
            Value::Number(n) => Self::Number(n.to_bits()),
            Value::BigInt(i) => Self::BigInt(*i),
            Value::String(s) => Self::Str(s.as_str().into()),
            Value::SharedString(s) => Self::Str(Box::from(&**s)),
            Value::Symbol(s) => Self::Symbol(s.as_str().into()),
            Value::Date(ms) => Self::Date(*ms),
            Value::RegExp(re) => Self::RegExp(re.source.as_str().into(), re.flags.bits()),
            Value::Binary(bin) => {
                Self::Binary(bin.view_kind().map(|k| k.code()), bin.bytes().into())
            }
            Value::Path(p) => Self::Path(p.flavor.code(), p.path.as_str().into()),
            Value::Error(err) => Self::Identity(&**err as *const _ as usize),
            Value::Array(_)
            | Value::Records(_)
            | Value::Map(_)
            | Value::Set(_)
            | Value::Object(_)
            | Value::PathCollection(_) => Self::Identity(value.identity().unwrap_or(0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Record (plain string-keyed object)
// ---------------------------------------------------------------------------

/// A string-keyed record that iterates in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Record {
    entries: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(cap),
        }
    }

    /// Insert or replace a field.  A replaced field keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Fields that are written on the wire (undefined fields are skipped).
    pub fn defined(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(|(_, v)| !v.is_undefined())
    }

    pub fn defined_len(&self) -> usize {
        self.defined().count()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

// ---------------------------------------------------------------------------
// MapValue
// ---------------------------------------------------------------------------

/// An insertion-ordered map with SameValueZero key equality.
#[derive(Clone, Debug, Default)]
pub struct MapValue {
    entries: IndexMap<ZeroKey, (Value, Value)>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(cap),
        }
    }

    /// Insert or replace.  A replaced entry keeps its original key and
    /// position.
    pub fn insert(&mut self, key: Value, value: Value) -> Option<Value> {
        match self.entries.entry(ZeroKey::of(&key)) {
            Entry::Occupied(mut slot) => Some(std::mem::replace(&mut slot.get_mut().1, value)),
            Entry::Vacant(slot) => {
                slot.insert((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(&ZeroKey::of(key)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(&ZeroKey::of(key))
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.entries.shift_remove(&ZeroKey::of(key)).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(k, v)| (k, v))
    }
}

impl FromIterator<(Value, Value)> for MapValue {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = MapValue::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// ---------------------------------------------------------------------------
// SetValue
// ---------------------------------------------------------------------------

/// An insertion-ordered set with SameValueZero membership.
#[derive(Clone, Debug, Default)]
pub struct SetValue {
    items: IndexMap<ZeroKey, Value>,
}

impl SetValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            items: IndexMap::with_capacity(cap),
        }
    }

    /// Returns false if an equal member was already present.
    pub fn insert(&mut self, value: Value) -> bool {
        match self.items.entry(ZeroKey::of(&value)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains_key(&ZeroKey::of(value))
    }

    pub fn remove(&mut self, value: &Value) -> bool {
        self.items.shift_remove(&ZeroKey::of(value)).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.values()
    }
}

impl FromIterator<Value> for SetValue {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = SetValue::new();
        for v in iter {
            set.insert(v);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// RecordArray (templated object array)
// ---------------------------------------------------------------------------

/// An array of records that all share one key list.
///
/// Each row holds exactly one value per key, in key order.  The key list is
/// written once on the wire instead of once per record.
#[derive(Clone, Debug, Default)]
pub struct RecordArray {
    pub keys: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RecordArray {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            rows: Vec::new(),
        }
    }

    /// Append a row; returns false (and drops the row) if its width is wrong.
    pub fn push_row(&mut self, row: Vec<Value>) -> bool {
        if row.len() != self.keys.len() {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Build from records that all have the same keys in the same order.
    pub fn from_records(records: &[Record]) -> Option<Self> {
        let first = records.first()?;
        let keys: Vec<String> = first.keys().map(str::to_owned).collect();
        let mut out = Self::new(keys);
        for record in records {
            if !record.keys().eq(out.keys.iter().map(String::as_str)) {
                return None;
            }
            out.rows.push(record.iter().map(|(_, v)| v.clone()).collect());
        }
        Some(out)
    }

    /// Expand back into one record per row.
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| self.keys.iter().cloned().zip(row.iter().cloned()).collect())
            .collect()
    }

    pub fn get(&self, row: usize, key: &str) -> Option<&Value> {
        let col = self.keys.iter().position(|k| k == key)?;
        self.rows.get(row)?.get(col)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_insertion_order_on_replace() {
        let mut r = Record::new();
        r.insert("b", Value::from(1));
        r.insert("a", Value::from(2));
        r.insert("b", Value::from(3));
        let keys: Vec<_> = r.keys().collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(r.get("b"), Some(&Value::from(3)));
    }

    #[test]
    fn record_defined_skips_undefined() {
        let r: Record = [("a", Value::from(1)), ("c", Value::Undefined), ("n", Value::Null)]
            .into_iter()
            .collect();
        assert_eq!(r.len(), 3);
        assert_eq!(r.defined_len(), 2);
        assert_eq!(r.defined().map(|(k, _)| k).collect::<Vec<_>>(), ["a", "n"]);
    }

    #[test]
    fn map_uses_same_value_zero() {
        let mut m = MapValue::new();
        m.insert(Value::Number(0.0), Value::from("zero"));
        m.insert(Value::Number(-0.0), Value::from("still zero"));
        m.insert(Value::Number(f64::NAN), Value::from("nan"));
        m.insert(Value::Number(f64::NAN), Value::from("nan again"));
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(&Value::Number(0.0)), Some(&Value::from("still zero")));
    }

    #[test]
    fn set_ignores_duplicates_but_not_distinct_composites() {
        let mut s = SetValue::new();
        assert!(s.insert(Value::from("x")));
        assert!(!s.insert(Value::from("x")));
        assert!(s.insert(Value::array(vec![])));
        assert!(s.insert(Value::array(vec![])));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn errors_are_members_by_identity_dates_by_content() {
        use crate::value::{ErrorKind, ErrorValue};

        let err = Value::from(ErrorValue::new(ErrorKind::Error, "boom"));
        let mut s = SetValue::new();
        assert!(s.insert(err.clone()));
        assert!(s.insert(err));
        assert!(s.insert(Value::Date(5)));
        assert!(!s.insert(Value::Date(5)));
        assert_eq!(s.len(), 3);

        // A clone is a new error; the stored one still finds itself.
        let stored = s.iter().next().unwrap().clone();
        assert!(!s.contains(&stored));
        let first = s.iter().next().unwrap();
        assert!(s.contains(first));
    }

    #[test]
    fn removal_keeps_insertion_order() {
        let mut m: MapValue = (0..5).map(|i| (Value::from(i), Value::Null)).collect();
        assert_eq!(m.remove(&Value::from(2)), Some(Value::Null));
        let keys: Vec<_> = m.iter().map(|(k, _)| k.as_f64().unwrap()).collect();
        assert_eq!(keys, [0.0, 1.0, 3.0, 4.0]);

        let mut r: Record = [("a", Value::Null), ("b", Value::Null), ("c", Value::Null)]
            .into_iter()
            .collect();
        r.remove("a");
        assert_eq!(r.keys().collect::<Vec<_>>(), ["b", "c"]);
    }

    #[test]
    fn large_collections_build_quickly() {
        let set: SetValue = (0..200_000).map(Value::from).collect();
        assert_eq!(set.len(), 200_000);
        assert!(set.contains(&Value::Number(199_999.0)));
        let record: Record = (0..200_000).map(|i| (format!("k{i}"), Value::Null)).collect();
        assert_eq!(record.len(), 200_000);
    }

    #[test]
    fn record_array_from_uniform_records() {
        let rows = vec![
            [("id", Value::from(1)), ("name", Value::from("a"))]
                .into_iter()
                .collect::<Record>(),
            [("id", Value::from(2)), ("name", Value::from("b"))]
                .into_iter()
                .collect::<Record>(),
        ];
        let ra = RecordArray::from_records(&rows).unwrap();
        assert_eq!(ra.keys, ["id", "name"]);
        assert_eq!(ra.get(1, "name"), Some(&Value::from("b")));
        assert_eq!(ra.to_records().len(), 2);
    }

    #[test]
    fn record_array_rejects_mismatched_shapes() {
        let rows = vec![
            [("id", Value::from(1))].into_iter().collect::<Record>(),
            [("other", Value::from(2))].into_iter().collect::<Record>(),
        ];
        assert!(RecordArray::from_records(&rows).is_none());

        let mut ra = RecordArray::new(vec!["a".into()]);
        assert!(!ra.push_row(vec![]));
        assert!(ra.push_row(vec![Value::Null]));
    }
}
