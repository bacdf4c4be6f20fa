//! Decoded ZCL values and payload field lists

use crate::data_type::DataType;
use std::collections::BTreeMap;
use std::fmt;

/// A single decoded ZCL value
#[derive(Debug, Clone, PartialEq)]
pub enum ZclValue {
    /// No data, or the non-value marker of a string or collection
    Null,
    Bool(bool),
    Uint(u64),
    Int(i64),
    Float(f64),
    String(String),
    Octets(Vec<u8>),
    Array {
        element_type: DataType,
        elements: Vec<ZclValue>,
    },
    Struct(Vec<(DataType, ZclValue)>),
    /// Element path of a structured read or write
    Selector(StructuredSelector),
}

/// What a structured write does with the selected element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SelectorIndicator {
    /// Address the element at `indexes`, or the whole attribute without any
    #[default]
    Whole = 0x00,
    /// Add the element to a set or bag
    WriteAdd = 0x10,
    /// Remove the element from a set or bag
    WriteRemove = 0x20,
}

/// Index path into an array or structure attribute
///
/// On the wire: one byte holding the indicator in the high nibble and the
/// number of indexes in the low nibble, then each index as a `uint16`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredSelector {
    pub indicator: SelectorIndicator,
    pub indexes: Vec<u16>,
}

impl StructuredSelector {
    /// Selector for the whole attribute
    #[must_use]
    pub fn whole() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn at(indexes: &[u16]) -> Self {
        Self {
            indicator: SelectorIndicator::Whole,
            indexes: indexes.to_vec(),
        }
    }
}

impl From<StructuredSelector> for ZclValue {
    fn from(v: StructuredSelector) -> Self {
        Self::Selector(v)
    }
}

impl ZclValue {
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::Bool(v) => Some(u64::from(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Uint(v) => i64::try_from(*v).ok(),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Uint(v) => Some(*v != 0),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ZclValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! unsigned_from {
    ($($t:ty),*) => {
        $(impl From<$t> for ZclValue {
            fn from(v: $t) -> Self {
                Self::Uint(u64::from(v))
            }
        })*
    };
}

macro_rules! signed_from {
    ($($t:ty),*) => {
        $(impl From<$t> for ZclValue {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

unsigned_from!(u8, u16, u32, u64);
signed_from!(i8, i16, i32, i64);

impl From<f64> for ZclValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ZclValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ZclValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for ZclValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Octets(v)
    }
}

/// Ordered list of named payload fields
///
/// Field order matters: presence conditions of a parameter are evaluated
/// against the fields that precede it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, ZclValue)>);

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<ZclValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field, replacing an existing value of the same name in place
    pub fn insert(&mut self, name: &str, value: impl Into<ZclValue>) {
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.0.push((name.to_string(), value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ZclValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ZclValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Attribute reference by name or numeric id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKey {
    Name(String),
    Id(u16),
    /// Numeric id with an explicit type, for attributes missing from the cluster definition
    Typed(u16, DataType),
}

impl From<&str> for AttributeKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for AttributeKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u16> for AttributeKey {
    fn from(id: u16) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Id(id) | Self::Typed(id, _) => write!(f, "{id}"),
        }
    }
}

/// Decoded attribute values keyed by name, or numeric id when unresolved
pub type AttributeMap = BTreeMap<AttributeKey, ZclValue>;
