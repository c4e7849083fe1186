//! Structural serializer for the installer RPC layer.
//!
//! Values travel between the installer client and server as JSON, but both
//! sides think in terms of records, enums, unions, optionals and collections.
//! This crate maps between the two, driven purely by a type annotation.
//!
//! # Crate layout
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`types`] | Shape descriptions: [`Annotation`], [`RecordDef`], [`EnumDef`], [`Field`] |
//! | [`value`] | Native values: [`Value`], [`Record`], [`EnumValue`] |
//! | [`serialize`] | The configurable [`Serializer`] |
//! | [`typed`] | [`Typed`], the bridge from plain Rust types |
//! | [`error`] | [`SerializationError`] with a path into the value |
//!
//! # Quick start
//!
//! ```rust
//! use installrpc::{Annotation, Field, Record, RecordDef, Serializer, Value};
//!
//! let data = Annotation::record(
//!     RecordDef::new("Data")
//!         .field(Field::new("field1", Annotation::Str))
//!         .field(Field::new("field2", Annotation::Int)),
//! );
//! let value = Value::from(Record::new("Data").with("field1", "a").with("field2", 1));
//!
//! let serializer = Serializer::new();
//! let json = serializer.serialize(&data, &value).unwrap();
//! assert_eq!(json, serde_json::json!({"field1": "a", "field2": 1}));
//! assert_eq!(serializer.deserialize(&data, &json).unwrap(), value);
//! ```

pub mod error;
pub mod serialize;
pub mod typed;
pub mod types;
pub mod value;

pub use error::SerializationError;
pub use serialize::{EnumEncoding, Serializer, DEFAULT_TIME_FMT, TYPE_TAG};
pub use typed::Typed;
pub use types::{Annotation, EnumDef, Field, RecordDef, Variant};
pub use value::{EnumValue, EnumVariant, Record, Value};
