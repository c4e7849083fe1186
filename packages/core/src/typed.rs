//! [`Typed`]: Rust types with a fixed [`Annotation`].
//!
//! Handlers and callers mostly deal in plain Rust types; this trait moves
//! them in and out of [`Value`] so they can ride through the serializer.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::error::SerializationError;
use crate::types::Annotation;
use crate::value::Value;

/// A Rust type that maps onto a single annotation.
pub trait Typed: Sized {
    fn annotation() -> Annotation;
    fn into_value(self) -> Value;
    fn from_value(value: Value) -> Result<Self, SerializationError>;
}

fn wrong_kind<T: Typed>(value: &Value) -> SerializationError {
    SerializationError::new(
        "",
        format!("expected {}, found {}", T::annotation(), value.kind()),
    )
}

impl Typed for i64 {
    fn annotation() -> Annotation {
        Annotation::Int
    }
    fn into_value(self) -> Value {
        Value::Int(self)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        value.as_i64().ok_or_else(|| wrong_kind::<Self>(&value))
    }
}

macro_rules! narrow_int {
    ($($t:ty),*) => {$(
        impl Typed for $t {
            fn annotation() -> Annotation {
                Annotation::Int
            }
            fn into_value(self) -> Value {
                Value::Int(i64::from(self))
            }
            fn from_value(value: Value) -> Result<Self, SerializationError> {
                let wide = value.as_i64().ok_or_else(|| wrong_kind::<Self>(&value))?;
                <$t>::try_from(wide).map_err(|_| {
                    SerializationError::new("", format!("{wide} does not fit in {}", stringify!($t)))
                })
            }
        }
    )*};
}

narrow_int!(i32, u32, u16, u8);

impl Typed for f64 {
    fn annotation() -> Annotation {
        Annotation::Float
    }
    fn into_value(self) -> Value {
        Value::Float(self)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Any(ref j) if j.is_number() => j.as_f64().ok_or_else(|| wrong_kind::<Self>(&value)),
            other => Err(wrong_kind::<Self>(&other)),
        }
    }
}

impl Typed for bool {
    fn annotation() -> Annotation {
        Annotation::Bool
    }
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        value.as_bool().ok_or_else(|| wrong_kind::<Self>(&value))
    }
}

impl Typed for String {
    fn annotation() -> Annotation {
        Annotation::Str
    }
    fn into_value(self) -> Value {
        Value::Str(self)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Str(s) | Value::Any(serde_json::Value::String(s)) => Ok(s),
            other => Err(wrong_kind::<Self>(&other)),
        }
    }
}

impl Typed for () {
    fn annotation() -> Annotation {
        Annotation::None
    }
    fn into_value(self) -> Value {
        Value::None
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        if value.is_none() {
            Ok(())
        } else {
            Err(wrong_kind::<Self>(&value))
        }
    }
}

impl Typed for NaiveDateTime {
    fn annotation() -> Annotation {
        Annotation::DateTime
    }
    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(wrong_kind::<Self>(&other)),
        }
    }
}

/// Untyped JSON. Only [`Value::Any`] converts back.
impl Typed for serde_json::Value {
    fn annotation() -> Annotation {
        Annotation::Any
    }
    fn into_value(self) -> Value {
        Value::Any(self)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Any(j) => Ok(j),
            other => Err(wrong_kind::<Self>(&other)),
        }
    }
}

impl<T: Typed> Typed for Option<T> {
    fn annotation() -> Annotation {
        Annotation::optional(T::annotation())
    }
    fn into_value(self) -> Value {
        self.map_or(Value::None, T::into_value)
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        if value.is_none() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn annotation() -> Annotation {
        Annotation::list(T::annotation())
    }
    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    T::from_value(item).map_err(|e| {
                        SerializationError::new(format!("[{i}]{}", e.path), e.message)
                    })
                })
                .collect(),
            other => Err(wrong_kind::<Self>(&other)),
        }
    }
}

impl<T: Typed> Typed for BTreeMap<String, T> {
    fn annotation() -> Annotation {
        Annotation::map(Annotation::Str, T::annotation())
    }
    fn into_value(self) -> Value {
        Value::Map(
            self.into_iter()
                .map(|(k, v)| (Value::Str(k), v.into_value()))
                .collect(),
        )
    }
    fn from_value(value: Value) -> Result<Self, SerializationError> {
        match value {
            Value::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| {
                    let key = String::from_value(k)?;
                    let v = T::from_value(v).map_err(|e| {
                        SerializationError::new(format!("['{key}']{}", e.path), e.message)
                    })?;
                    Ok((key, v))
                })
                .collect(),
            other => Err(wrong_kind::<Self>(&other)),
        }
    }
}
