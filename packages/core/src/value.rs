//! Native values: the in-memory side of the serializer.
//!
//! [`Value`] is a sum type, so the question "which alternative of a union is
//! this?" is answered by construction: a record carries its record name, an
//! enum value carries its enum name, and scalars are distinguished by variant
//! (`Bool` is never an `Int`). The `$type` tag only exists on the wire.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// A structured value that an [`Annotation`](crate::Annotation) describes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    /// Ordered key/value pairs; keys may be any value.
    Map(Vec<(Value, Value)>),
    Record(Record),
    Enum(EnumValue),
    /// An untyped JSON value.
    Any(serde_json::Value),
}

impl Value {
    /// Short name of the value's shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::DateTime(_) => "datetime",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::Record(_) => "record",
            Value::Enum(_) => "enum",
            Value::Any(_) => "Any",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None | Value::Any(serde_json::Value::Null))
    }

    /// The string inside a `Str`, or inside an untyped JSON string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Any(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Any(j) => j.as_i64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Any(j) => j.as_bool(),
            _ => None,
        }
    }

    /// Member lookup: a record field, or the value under a string key of a
    /// map or untyped JSON object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(r) => r.get(key),
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn any(json: serde_json::Value) -> Self {
        Value::Any(json)
    }

    /// Build a string-keyed map.
    pub fn map<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (Value::Str(k.into()), v.into()))
                .collect(),
        )
    }
}

/// Handlers with nothing to return produce `None`.
impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::None
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::None, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// An instance of a [`RecordDef`](crate::RecordDef), keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

// ---------------------------------------------------------------------------
// Enum values
// ---------------------------------------------------------------------------

/// A value of an [`EnumDef`](crate::EnumDef).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub enum_name: String,
    pub variant: EnumVariant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumVariant {
    /// A declared variant, by name.
    Known(String),
    /// A wire string a non-exhaustive enum did not recognise.
    Unknown(String),
}

impl EnumValue {
    pub fn known(enum_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            enum_name: enum_name.into(),
            variant: EnumVariant::Known(variant.into()),
        }
    }

    pub fn unknown(enum_name: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            enum_name: enum_name.into(),
            variant: EnumVariant::Unknown(raw.into()),
        }
    }
}
