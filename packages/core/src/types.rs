//! Type annotations: the shape descriptions that drive (de)serialization.
//!
//! An [`Annotation`] says what a value looks like on both sides of the wire.
//! Records and enums are described by [`RecordDef`] and [`EnumDef`], shared
//! through [`Arc`] so an annotation tree is cheap to clone and can be handed
//! to every request handler.

use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// The shape of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Int,
    Float,
    Str,
    Bool,
    /// The unit value; serializes as JSON `null`.
    None,
    /// A naive date-time, encoded as a string (see [`Field::time_fmt`]).
    DateTime,
    /// Untyped: the JSON value passes through unchanged.
    Any,
    Record(Arc<RecordDef>),
    Enum(Arc<EnumDef>),
    /// `None` or the inner shape. Built by [`Annotation::optional`] or by
    /// [`Annotation::union`] when one arm is `None`.
    Optional(Box<Annotation>),
    /// Two or more alternatives, none of them `None` and none of them unions.
    Union(Vec<Annotation>),
    List(Box<Annotation>),
    /// Key and value shapes. String keys encode as a JSON object; anything
    /// else encodes as a sequence of `[key, value]` pairs.
    Map(Box<Annotation>, Box<Annotation>),
}

impl Annotation {
    pub fn optional(inner: Annotation) -> Self {
        match inner {
            Annotation::None | Annotation::Optional(_) => inner,
            other => Annotation::Optional(Box::new(other)),
        }
    }

    pub fn list(inner: Annotation) -> Self {
        Annotation::List(Box::new(inner))
    }

    pub fn map(key: Annotation, value: Annotation) -> Self {
        Annotation::Map(Box::new(key), Box::new(value))
    }

    /// A string-keyed map of untyped values, the equivalent of a bare `dict`.
    pub fn dict() -> Self {
        Annotation::map(Annotation::Str, Annotation::Any)
    }

    pub fn record(def: RecordDef) -> Self {
        Annotation::Record(Arc::new(def))
    }

    pub fn enumeration(def: EnumDef) -> Self {
        Annotation::Enum(Arc::new(def))
    }

    /// Build a union, flattening nested unions and dropping duplicate arms.
    ///
    /// A `None` arm turns the result into [`Annotation::Optional`]; a single
    /// remaining arm is returned as-is.
    pub fn union(arms: impl IntoIterator<Item = Annotation>) -> Self {
        let mut flat: Vec<Annotation> = Vec::new();
        let mut nullable = false;
        fn push(arm: Annotation, flat: &mut Vec<Annotation>) {
            if !flat.contains(&arm) {
                flat.push(arm);
            }
        }
        for arm in arms {
            match arm {
                Annotation::None => nullable = true,
                Annotation::Optional(inner) => {
                    nullable = true;
                    match *inner {
                        Annotation::Union(inner_arms) => {
                            for a in inner_arms {
                                push(a, &mut flat);
                            }
                        }
                        other => push(other, &mut flat),
                    }
                }
                Annotation::Union(inner_arms) => {
                    for a in inner_arms {
                        push(a, &mut flat);
                    }
                }
                other => push(other, &mut flat),
            }
        }

        let base = match flat.len() {
            0 => return Annotation::None,
            1 => flat.remove(0),
            _ => Annotation::Union(flat),
        };
        if nullable {
            Annotation::optional(base)
        } else {
            base
        }
    }
}

/// Renders the annotation the way it would be written as a type hint,
/// e.g. `Optional[List[int]]`.
impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Int => write!(f, "int"),
            Annotation::Float => write!(f, "float"),
            Annotation::Str => write!(f, "str"),
            Annotation::Bool => write!(f, "bool"),
            Annotation::None => write!(f, "None"),
            Annotation::DateTime => write!(f, "datetime"),
            Annotation::Any => write!(f, "Any"),
            Annotation::Record(def) => write!(f, "{}", def.name),
            Annotation::Enum(def) => write!(f, "{}", def.name),
            Annotation::Optional(inner) => write!(f, "Optional[{inner}]"),
            Annotation::Union(arms) => {
                write!(f, "Union[")?;
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arm}")?;
                }
                write!(f, "]")
            }
            Annotation::List(inner) => write!(f, "List[{inner}]"),
            Annotation::Map(k, v) => write!(f, "Dict[{k}, {v}]"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A named, ordered set of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDef {
    pub name: String,
    pub fields: Vec<Field>,
}

impl RecordDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Look up a field by its declared (not wire) name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One field of a [`RecordDef`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub annotation: Annotation,
    /// Used when the field is absent on the wire or in the native record.
    pub default: Option<Value>,
    /// Overrides `name` as the object key in named-field mode.
    pub wire_name: Option<String>,
    /// `strftime`-style format for date-time fields.
    pub time_fmt: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: None,
            wire_name: None,
            time_fmt: None,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn rename(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    pub fn time_fmt(mut self, fmt: impl Into<String>) -> Self {
        self.time_fmt = Some(fmt.into());
        self
    }

    /// The key this field uses on the wire.
    pub fn key(&self) -> &str {
        self.wire_name.as_deref().unwrap_or(&self.name)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A closed (or, with [`EnumDef::non_exhaustive`], open) set of variants.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<Variant>,
    pub non_exhaustive: bool,
}

/// A variant name and the value it encodes to under
/// [`EnumEncoding::Value`](crate::EnumEncoding::Value).
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub name: String,
    pub value: serde_json::Value,
}

impl EnumDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variants: Vec::new(),
            non_exhaustive: false,
        }
    }

    /// Add a variant whose value is its own name.
    pub fn variant(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let value = serde_json::Value::String(name.clone());
        self.variant_with_value(name, value)
    }

    pub fn variant_with_value(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.variants.push(Variant {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Accept and preserve strings that match no known variant.
    pub fn non_exhaustive(mut self) -> Self {
        self.non_exhaustive = true;
        self
    }

    pub fn by_name(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn by_value(&self, value: &serde_json::Value) -> Option<&Variant> {
        self.variants.iter().find(|v| &v.value == value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Annotation {
        Annotation::record(RecordDef::new("Data").field(Field::new("x", Annotation::Int)))
    }

    #[test]
    fn union_with_none_becomes_optional() {
        let ann = Annotation::union([Annotation::Int, Annotation::None]);
        assert_eq!(ann, Annotation::optional(Annotation::Int));
    }

    #[test]
    fn nested_unions_are_flattened() {
        let inner = Annotation::union([Annotation::Int, Annotation::Str]);
        let ann = Annotation::union([inner, Annotation::Str, data()]);
        assert_eq!(
            ann,
            Annotation::Union(vec![Annotation::Int, Annotation::Str, data()])
        );
    }

    #[test]
    fn optional_of_union_keeps_all_arms() {
        let ann = Annotation::union([
            Annotation::optional(Annotation::union([Annotation::Int, Annotation::Bool])),
            Annotation::Str,
        ]);
        assert_eq!(
            ann,
            Annotation::optional(Annotation::Union(vec![
                Annotation::Int,
                Annotation::Bool,
                Annotation::Str
            ]))
        );
    }

    #[test]
    fn display_reads_like_a_type_hint() {
        let ann = Annotation::optional(Annotation::list(Annotation::map(
            Annotation::Str,
            data(),
        )));
        assert_eq!(ann.to_string(), "Optional[List[Dict[str, Data]]]");
    }

    #[test]
    fn field_key_prefers_wire_name() {
        let f = Field::new("field_1", Annotation::Int).rename("field-1");
        assert_eq!(f.key(), "field-1");
        assert_eq!(Field::new("plain", Annotation::Int).key(), "plain");
    }
}
