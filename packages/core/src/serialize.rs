//! Annotation-driven conversion between [`Value`]s and JSON.
//!
//! A [`Serializer`] is configured once and reused for many calls; client and
//! server must use the same configuration for values to round-trip.
//!
//! # Wire shapes
//!
//! | Annotation | Named-field mode | Compact mode |
//! |------------|------------------|--------------|
//! | record | `{"a": 1, "b": 2}` | `[1, 2]` |
//! | record arm of a union | `{"$type": "R", "a": 1}` | `["R", 1]` |
//! | scalar arm of a union | untagged | untagged |
//! | enum | `"NAME"` or its value | same |
//! | map with `str` keys | `{"k": v}` | same |
//! | map with other keys | `[[k, v], ...]` | same |

use std::fmt::Write;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde_json::{Map, Number, Value as Json};

use crate::error::{index_path, member_path, SerializationError};
use crate::types::{Annotation, EnumDef, RecordDef, Variant};
use crate::value::{EnumValue, EnumVariant, Record, Value};

/// Object key carrying the record name of a union member.
pub const TYPE_TAG: &str = "$type";

/// Date-time format used when a field carries no `time_fmt`.
pub const DEFAULT_TIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

type Result<T> = std::result::Result<T, SerializationError>;

/// How enum variants are written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumEncoding {
    /// The variant name.
    #[default]
    Name,
    /// The variant's declared value.
    Value,
}

impl FromStr for EnumEncoding {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(EnumEncoding::Name),
            "value" => Ok(EnumEncoding::Value),
            _ => Err(format!(
                "unknown enum encoding {s:?}; expected one of: name, value"
            )),
        }
    }
}

/// Structural serializer. Cheap to copy; immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Serializer {
    compact: bool,
    ignore_unknown_fields: bool,
    serialize_enums_by: EnumEncoding,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records as positional arrays; tagged union members as `[name, ...]`.
    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Drop record keys that match no field instead of failing.
    pub fn ignore_unknown_fields(mut self, ignore: bool) -> Self {
        self.ignore_unknown_fields = ignore;
        self
    }

    pub fn serialize_enums_by(mut self, encoding: EnumEncoding) -> Self {
        self.serialize_enums_by = encoding;
        self
    }

    pub fn serialize(&self, annotation: &Annotation, value: &Value) -> Result<Json> {
        self.ser(annotation, value, None, "")
    }

    pub fn deserialize(&self, annotation: &Annotation, json: &Json) -> Result<Value> {
        self.de(annotation, json, None, "")
    }

    pub fn to_json(&self, annotation: &Annotation, value: &Value) -> Result<String> {
        let json = self.serialize(annotation, value)?;
        serde_json::to_string(&json).map_err(|e| SerializationError::new("", e.to_string()))
    }

    pub fn from_json(&self, annotation: &Annotation, text: &str) -> Result<Value> {
        let json: Json = serde_json::from_str(text)
            .map_err(|e| SerializationError::new("", format!("invalid JSON: {e}")))?;
        self.deserialize(annotation, &json)
    }

    // --- serialization -------------------------------------------------------

    fn ser(
        &self,
        annotation: &Annotation,
        value: &Value,
        time_fmt: Option<&str>,
        path: &str,
    ) -> Result<Json> {
        match (annotation, value) {
            (Annotation::Any, v) => plain_json(v, path),
            (Annotation::None, Value::None) => Ok(Json::Null),
            (Annotation::Bool, Value::Bool(b)) => Ok(Json::Bool(*b)),
            (Annotation::Int, Value::Int(i)) => Ok(Json::from(*i)),
            (Annotation::Float, Value::Float(f)) => Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| SerializationError::new(path, format!("cannot encode {f}"))),
            (Annotation::Str, Value::Str(s)) => Ok(Json::String(s.clone())),
            (Annotation::DateTime, Value::DateTime(dt)) => {
                format_datetime(dt, time_fmt.unwrap_or(DEFAULT_TIME_FMT), path).map(Json::String)
            }
            (Annotation::Record(def), Value::Record(r)) if def.name == r.name => {
                self.ser_record(def, r, path)
            }
            (Annotation::Enum(def), v) => self.ser_enum(def, v, path),
            (Annotation::Optional(_), Value::None) => Ok(Json::Null),
            (Annotation::Optional(inner), v) => self.ser(inner, v, time_fmt, path),
            (Annotation::Union(arms), v) => self.ser_union(arms, v, path),
            (Annotation::List(inner), Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.ser(inner, item, time_fmt, &index_path(path, i)))
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            (Annotation::Map(key, val), Value::Map(pairs)) => {
                self.ser_map(key, val, pairs, path)
            }
            (ann, v) => Err(mismatch(path, ann, v.kind())),
        }
    }

    fn ser_record(&self, def: &RecordDef, record: &Record, path: &str) -> Result<Json> {
        if let Some(extra) = record.fields.keys().find(|k| def.get(k).is_none()) {
            return Err(SerializationError::new(
                member_path(path, extra),
                format!("{} has no field {extra:?}", def.name),
            ));
        }

        let mut named = Map::new();
        let mut positional = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let field_path = member_path(path, field.key());
            let value = record
                .get(&field.name)
                .or(field.default.as_ref())
                .ok_or_else(|| SerializationError::missing_argument(path, &field.name))?;
            let json = self.ser(&field.annotation, value, field.time_fmt.as_deref(), &field_path)?;
            if self.compact {
                positional.push(json);
            } else {
                named.insert(field.key().to_string(), json);
            }
        }

        Ok(if self.compact {
            Json::Array(positional)
        } else {
            Json::Object(named)
        })
    }

    fn ser_enum(&self, def: &EnumDef, value: &Value, path: &str) -> Result<Json> {
        match value {
            Value::Enum(EnumValue {
                enum_name,
                variant: EnumVariant::Known(name),
            }) if *enum_name == def.name => {
                let variant = def.by_name(name).ok_or_else(|| {
                    SerializationError::new(path, format!("{} has no variant {name:?}", def.name))
                })?;
                Ok(match self.serialize_enums_by {
                    EnumEncoding::Name => Json::String(variant.name.clone()),
                    EnumEncoding::Value => variant.value.clone(),
                })
            }
            Value::Enum(EnumValue {
                enum_name,
                variant: EnumVariant::Unknown(raw),
            }) if *enum_name == def.name && def.non_exhaustive => Ok(Json::String(raw.clone())),
            // Already in wire form.
            Value::Str(raw) if def.non_exhaustive => Ok(Json::String(raw.clone())),
            v => Err(mismatch(path, &Annotation::Enum(def.clone().into()), v.kind())),
        }
    }

    fn ser_union(&self, arms: &[Annotation], value: &Value, path: &str) -> Result<Json> {
        let matching: Vec<&Annotation> = arms
            .iter()
            .filter(|arm| !matches!(arm, Annotation::Any) && arm_matches(arm, value))
            .collect();
        let arm = match matching.as_slice() {
            [arm] => *arm,
            [] => arms
                .iter()
                .find(|arm| matches!(arm, Annotation::Any))
                .ok_or_else(|| {
                    SerializationError::new(
                        path,
                        format!(
                            "{} matches no alternative of {}",
                            value.kind(),
                            Annotation::Union(arms.to_vec())
                        ),
                    )
                })?,
            _ => {
                return Err(SerializationError::new(
                    path,
                    format!(
                        "{} matches several alternatives of {}",
                        value.kind(),
                        Annotation::Union(arms.to_vec())
                    ),
                ))
            }
        };

        let json = self.ser(arm, value, None, path)?;
        if let Annotation::Record(def) = arm {
            return Ok(self.tag(&def.name, json));
        }

        // Untagged members must be recoverable from the JSON type alone.
        match self.untagged_candidates(arms, &json).as_slice() {
            [only] if *only == arm => Ok(json),
            _ if matches!(arm, Annotation::Any) => Ok(json),
            _ => Err(SerializationError::new(
                path,
                format!(
                    "{} value is ambiguous in {}",
                    arm,
                    Annotation::Union(arms.to_vec())
                ),
            )),
        }
    }

    fn tag(&self, name: &str, json: Json) -> Json {
        match json {
            Json::Array(fields) if self.compact => {
                let mut tagged = Vec::with_capacity(fields.len() + 1);
                tagged.push(Json::String(name.to_string()));
                tagged.extend(fields);
                Json::Array(tagged)
            }
            Json::Object(fields) => {
                let mut tagged = Map::new();
                tagged.insert(TYPE_TAG.to_string(), Json::String(name.to_string()));
                tagged.extend(fields);
                Json::Object(tagged)
            }
            other => other,
        }
    }

    fn ser_map(
        &self,
        key: &Annotation,
        val: &Annotation,
        pairs: &[(Value, Value)],
        path: &str,
    ) -> Result<Json> {
        if matches!(key, Annotation::Str) {
            let mut obj = Map::new();
            for (i, (k, v)) in pairs.iter().enumerate() {
                let k = k.as_str().ok_or_else(|| {
                    SerializationError::new(
                        index_path(path, i),
                        format!("dict must have only string keys, found {}", k.kind()),
                    )
                })?;
                obj.insert(k.to_string(), self.ser(val, v, None, &member_path(path, k))?);
            }
            return Ok(Json::Object(obj));
        }

        pairs
            .iter()
            .enumerate()
            .map(|(i, (k, v))| {
                let item = index_path(path, i);
                Ok(Json::Array(vec![
                    self.ser(key, k, None, &index_path(&item, 0))?,
                    self.ser(val, v, None, &index_path(&item, 1))?,
                ]))
            })
            .collect::<Result<Vec<_>>>()
            .map(Json::Array)
    }

    // --- deserialization -----------------------------------------------------

    fn de(
        &self,
        annotation: &Annotation,
        json: &Json,
        time_fmt: Option<&str>,
        path: &str,
    ) -> Result<Value> {
        match (annotation, json) {
            (Annotation::Any, j) => Ok(Value::Any(j.clone())),
            (Annotation::None, Json::Null) => Ok(Value::None),
            (Annotation::Bool, Json::Bool(b)) => Ok(Value::Bool(*b)),
            (Annotation::Int, Json::Number(n)) if n.is_i64() || n.is_u64() => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| SerializationError::new(path, format!("{n} is out of range"))),
            (Annotation::Float, Json::Number(n)) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| SerializationError::new(path, format!("{n} is not a float"))),
            (Annotation::Str, Json::String(s)) => Ok(Value::Str(s.clone())),
            (Annotation::DateTime, Json::String(s)) => {
                let fmt = time_fmt.unwrap_or(DEFAULT_TIME_FMT);
                NaiveDateTime::parse_from_str(s, fmt)
                    .map(Value::DateTime)
                    .map_err(|e| {
                        SerializationError::new(path, format!("{s:?} does not match {fmt:?}: {e}"))
                    })
            }
            (Annotation::Record(def), j) => self.de_record(def, j, path),
            (Annotation::Enum(def), j) => self.de_enum(def, j, path),
            (Annotation::Optional(_), Json::Null) => Ok(Value::None),
            (Annotation::Optional(inner), j) => self.de(inner, j, time_fmt, path),
            (Annotation::Union(arms), j) => self.de_union(arms, j, path),
            (Annotation::List(inner), Json::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.de(inner, item, time_fmt, &index_path(path, i)))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            (Annotation::Map(key, val), j) => self.de_map(key, val, j, path),
            (ann, j) => Err(mismatch(path, ann, json_kind(j))),
        }
    }

    fn de_record(&self, def: &RecordDef, json: &Json, path: &str) -> Result<Value> {
        let mut record = Record::new(def.name.clone());
        match json {
            Json::Object(obj) if !self.compact => {
                for key in obj.keys() {
                    // A tag left over from a union member is not a field.
                    if key == TYPE_TAG {
                        continue;
                    }
                    if !self.ignore_unknown_fields && !def.fields.iter().any(|f| f.key() == key) {
                        return Err(SerializationError::new(
                            member_path(path, key),
                            format!("unexpected field {key:?} for {}", def.name),
                        ));
                    }
                }
                for field in &def.fields {
                    let field_path = member_path(path, field.key());
                    let value = match obj.get(field.key()) {
                        Some(j) => {
                            self.de(&field.annotation, j, field.time_fmt.as_deref(), &field_path)?
                        }
                        None => field.default.clone().ok_or_else(|| {
                            SerializationError::missing_argument(path, &field.name)
                        })?,
                    };
                    record.fields.insert(field.name.clone(), value);
                }
            }
            Json::Array(items) if self.compact => {
                if items.len() > def.fields.len() && !self.ignore_unknown_fields {
                    return Err(SerializationError::new(
                        path,
                        format!(
                            "{} takes {} fields but {} were given",
                            def.name,
                            def.fields.len(),
                            items.len()
                        ),
                    ));
                }
                for (i, field) in def.fields.iter().enumerate() {
                    let field_path = member_path(path, field.key());
                    let value = match items.get(i) {
                        Some(j) => {
                            self.de(&field.annotation, j, field.time_fmt.as_deref(), &field_path)?
                        }
                        None => field.default.clone().ok_or_else(|| {
                            SerializationError::missing_argument(path, &field.name)
                        })?,
                    };
                    record.fields.insert(field.name.clone(), value);
                }
            }
            j => {
                return Err(mismatch(
                    path,
                    &Annotation::Record(def.clone().into()),
                    json_kind(j),
                ))
            }
        }
        Ok(Value::Record(record))
    }

    /// The variant `json` names under the configured encoding.
    fn known_variant<'d>(&self, def: &'d EnumDef, json: &Json) -> Option<&'d Variant> {
        match self.serialize_enums_by {
            EnumEncoding::Name => json.as_str().and_then(|s| def.by_name(s)),
            EnumEncoding::Value => def.by_value(json),
        }
    }

    fn de_enum(&self, def: &EnumDef, json: &Json, path: &str) -> Result<Value> {
        match (self.known_variant(def, json), json) {
            (Some(variant), _) => Ok(Value::Enum(EnumValue::known(&def.name, &variant.name))),
            (None, Json::String(raw)) if def.non_exhaustive => {
                Ok(Value::Enum(EnumValue::unknown(&def.name, raw)))
            }
            (None, j) => Err(SerializationError::new(
                path,
                format!("{j} is not a valid {}", def.name),
            )),
        }
    }

    fn de_union(&self, arms: &[Annotation], json: &Json, path: &str) -> Result<Value> {
        let records = || {
            arms.iter().filter_map(|arm| match arm {
                Annotation::Record(def) => Some(def),
                _ => None,
            })
        };

        match json {
            Json::Object(obj) if !self.compact => {
                if let Some(tag) = obj.get(TYPE_TAG).and_then(Json::as_str) {
                    let def = records().find(|def| def.name == tag).ok_or_else(|| {
                        SerializationError::new(
                            member_path(path, TYPE_TAG),
                            format!("{tag:?} is not an alternative of {}", Annotation::Union(arms.to_vec())),
                        )
                    })?;
                    return self.de_record(def, json, path);
                }
            }
            Json::Array(items) if self.compact => {
                if let Some(tag) = items.first().and_then(Json::as_str) {
                    if let Some(def) = records().find(|def| def.name == tag) {
                        return self.de_record(def, &Json::Array(items[1..].to_vec()), path);
                    }
                }
            }
            _ => {}
        }

        match self.untagged_candidates(arms, json).as_slice() {
            [arm] => self.de(arm, json, None, path),
            [] => match arms.iter().find(|arm| matches!(arm, Annotation::Any)) {
                Some(any) => self.de(any, json, None, path),
                None => Err(SerializationError::new(
                    path,
                    format!(
                        "{} matches no alternative of {}",
                        json_kind(json),
                        Annotation::Union(arms.to_vec())
                    ),
                )),
            },
            _ => Err(SerializationError::new(
                path,
                format!(
                    "{} is ambiguous in {}",
                    json_kind(json),
                    Annotation::Union(arms.to_vec())
                ),
            )),
        }
    }

    /// The untagged arms a JSON value could belong to: its JSON type for
    /// scalar and collection arms, the configured encoding for enum arms.
    fn untagged_candidates<'a>(&self, arms: &'a [Annotation], json: &Json) -> Vec<&'a Annotation> {
        let accepts = |arm: &Annotation| -> bool {
            if let Annotation::Enum(def) = arm {
                return self.known_variant(def, json).is_some()
                    || (def.non_exhaustive && json.is_string());
            }
            match json {
                Json::Null => matches!(arm, Annotation::None),
                Json::Bool(_) => matches!(arm, Annotation::Bool),
                Json::Number(n) if n.is_f64() => matches!(arm, Annotation::Float),
                Json::Number(_) => matches!(arm, Annotation::Int),
                Json::String(_) => matches!(arm, Annotation::Str | Annotation::DateTime),
                Json::Array(_) => matches!(arm, Annotation::List(_)) || is_pair_map(arm),
                Json::Object(_) => {
                    matches!(arm, Annotation::Map(k, _) if matches!(**k, Annotation::Str))
                }
            }
        };
        let found: Vec<&Annotation> = arms.iter().filter(|arm| accepts(*arm)).collect();
        // Integral numbers still fit a float arm when nothing else takes them.
        if found.is_empty() && matches!(json, Json::Number(n) if !n.is_f64()) {
            return arms
                .iter()
                .filter(|arm| matches!(arm, Annotation::Float))
                .collect();
        }
        found
    }

    fn de_map(&self, key: &Annotation, val: &Annotation, json: &Json, path: &str) -> Result<Value> {
        match json {
            Json::Object(obj) if matches!(key, Annotation::Str) => obj
                .iter()
                .map(|(k, v)| {
                    Ok((
                        Value::Str(k.clone()),
                        self.de(val, v, None, &member_path(path, k))?,
                    ))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Map),
            Json::Array(items) if !matches!(key, Annotation::Str) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let item_path = index_path(path, i);
                    match item.as_array().map(Vec::as_slice) {
                        Some([k, v]) => Ok((
                            self.de(key, k, None, &index_path(&item_path, 0))?,
                            self.de(val, v, None, &index_path(&item_path, 1))?,
                        )),
                        _ => Err(SerializationError::new(
                            item_path,
                            "expected a [key, value] pair",
                        )),
                    }
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Map),
            j => Err(mismatch(
                path,
                &Annotation::Map(Box::new(key.clone()), Box::new(val.clone())),
                json_kind(j),
            )),
        }
    }
}

// --- helpers -----------------------------------------------------------------

fn mismatch(path: &str, annotation: &Annotation, found: &str) -> SerializationError {
    SerializationError::new(path, format!("expected {annotation}, found {found}"))
}

fn format_datetime(dt: &NaiveDateTime, fmt: &str, path: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(fmt))
        .map_err(|_| SerializationError::new(path, format!("invalid time format {fmt:?}")))?;
    Ok(out)
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(n) if n.is_f64() => "float",
        Json::Number(_) => "int",
        Json::String(_) => "str",
        Json::Array(_) => "list",
        Json::Object(_) => "dict",
    }
}

/// Whether `value` is an instance of `arm`, by exact kind.
fn arm_matches(arm: &Annotation, value: &Value) -> bool {
    match (arm, value) {
        (Annotation::Int, Value::Int(_))
        | (Annotation::Float, Value::Float(_))
        | (Annotation::Str, Value::Str(_))
        | (Annotation::Bool, Value::Bool(_))
        | (Annotation::None, Value::None)
        | (Annotation::DateTime, Value::DateTime(_))
        | (Annotation::List(_), Value::List(_))
        | (Annotation::Map(..), Value::Map(_)) => true,
        (Annotation::Record(def), Value::Record(r)) => def.name == r.name,
        (Annotation::Enum(def), Value::Enum(e)) => def.name == e.enum_name,
        (Annotation::Optional(inner), v) => matches!(v, Value::None) || arm_matches(inner, v),
        (Annotation::Union(arms), v) => arms.iter().any(|a| arm_matches(a, v)),
        _ => false,
    }
}

fn is_pair_map(annotation: &Annotation) -> bool {
    matches!(annotation, Annotation::Map(k, _) if !matches!(**k, Annotation::Str))
}

/// JSON for a value under the `Any` annotation: untyped values pass through,
/// plain scalars and collections convert structurally.
fn plain_json(value: &Value, path: &str) -> Result<Json> {
    Ok(match value {
        Value::Any(j) => j.clone(),
        Value::None => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| SerializationError::new(path, format!("cannot encode {f}")))?,
        Value::Str(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| plain_json(v, &index_path(path, i)))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(pairs) => {
            let mut obj = Map::new();
            for (i, (k, v)) in pairs.iter().enumerate() {
                let k = k.as_str().ok_or_else(|| {
                    SerializationError::new(index_path(path, i), "untyped dict keys must be strings")
                })?;
                obj.insert(k.to_string(), plain_json(v, &member_path(path, k))?);
            }
            Json::Object(obj)
        }
        v @ (Value::DateTime(_) | Value::Record(_) | Value::Enum(_)) => {
            return Err(SerializationError::new(
                path,
                format!("a {} needs an annotation to be serialized", v.kind()),
            ))
        }
    })
}
