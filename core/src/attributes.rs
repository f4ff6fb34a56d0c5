//! Multi-valued attributes and their wire encoding.
//!
//! # Design
//! On the wire an item's attributes are a flat list of `(name, value)`
//! pairs, every value a string, with no ordering guarantee. In memory they
//! are an `AttributeSet`: name to the ordered list of values as returned.
//! Duplicates are kept; nothing in the codec de-duplicates.
//!
//! Callers submit `AttributeValue`s, which have exactly one canonical
//! string form (`AttributeValue::to_wire`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value accepted for submission. Stored and returned as a string.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// Locale-independent string form: `true`/`false`, plain decimal
    /// integers, and the shortest decimal that round-trips for floats.
    pub fn to_wire(&self) -> String {
        match self {
            AttributeValue::Bool(b) => b.to_string(),
            AttributeValue::Integer(i) => i.to_string(),
            AttributeValue::Float(f) => f.to_string(),
            AttributeValue::Text(s) => s.clone(),
        }
    }

    /// `false` only for NaN and infinite floats, which have no decimal form.
    pub fn is_finite(&self) -> bool {
        match self {
            AttributeValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

macro_rules! integer_value {
    ($($t:ty),*) => {
        $(impl From<$t> for AttributeValue {
            fn from(v: $t) -> Self {
                AttributeValue::Integer(i64::from(v))
            }
        })*
    };
}

integer_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

/// One indexed `(name, value, replace)` tuple as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePair {
    pub index: usize,
    pub name: String,
    pub value: String,
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    name: String,
    value: AttributeValue,
    replace: bool,
}

/// Attributes to submit in a put or value-specific delete, in caller order.
///
/// ```
/// use sdb_core::Attributes;
///
/// let attrs = Attributes::new()
///     .add("answer", 42)
///     .add("answer", true)
///     .replace("question", "What is the answer?");
/// assert_eq!(attrs.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: Vec<Entry>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value, keeping any values already stored under `name`.
    pub fn add(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.push(name, value, false);
        self
    }

    /// Adds a value that replaces all values stored under `name`.
    pub fn replace(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.push(name, value, true);
        self
    }

    /// Appends every value in `values` under `name`.
    pub fn add_all<V: Into<AttributeValue>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let name = name.into();
        for value in values {
            self.push(name.clone(), value, false);
        }
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>, replace: bool) {
        self.entries.push(Entry {
            name: name.into(),
            value: value.into(),
            replace,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `(name, value)` in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattens into indexed wire pairs. `replace_all` forces the replace
    /// flag on every pair; otherwise the per-name flags set by `replace`
    /// apply.
    pub fn encode(&self, replace_all: bool) -> Vec<WirePair> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, e)| WirePair {
                index,
                name: e.name.clone(),
                value: e.value.to_wire(),
                replace: replace_all || e.replace,
            })
            .collect()
    }
}

/// Attributes as returned by the service: name to values in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, Vec<String>>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds wire pairs into the multi-valued map. Pairs for one name need
    /// not be adjacent.
    pub fn decode<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.push(name, value);
        }
        set
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value stored under `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self::decode(iter)
    }
}
