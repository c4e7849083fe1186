//! Declarative API definitions for the installer RPC layer.
//!
//! An API surface is declared once as a tree of [`Endpoint`]s, each carrying
//! HTTP-verb [`MethodDef`]s, and then frozen with [`Api::define`]. Definition
//! assigns every node its URL path and qualified name, resolves inherited
//! flags, and rejects malformed trees before anything is served.
//!
//! ```rust
//! use installrpc::Annotation;
//! use installrpc_api::{Api, Endpoint, MethodDef};
//!
//! let api = Api::define(
//!     Endpoint::root("API").child(
//!         Endpoint::path_parameter("param")
//!             .method(MethodDef::get().param("arg", Annotation::Str).returns(Annotation::Str)),
//!     ),
//! )
//! .unwrap();
//!
//! let node = api.root().child("param").unwrap();
//! assert_eq!(node.path(), "/{param}");
//! assert_eq!(node.handler_key(installrpc_api::Verb::Get), "param_GET");
//! ```
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`defs`] | The builders: [`Endpoint`], [`MethodDef`], [`Param`], [`Verb`] |
//! | [`tree`] | The validated tree: [`Api`], [`ApiNode`] |
//! | [`headers`] | Response header names and `x-status` values |
//! | [`report`] | [`ErrorReportRef`], the body of `x-error-report` |

pub mod defs;
pub mod error;
pub mod headers;
pub mod report;
pub mod tree;

pub use defs::{simple_endpoint, Endpoint, MethodDef, Param, Verb};
pub use error::ApiDefinitionError;
pub use report::{ErrorReportKind, ErrorReportRef, ErrorReportState};
pub use tree::{literal_segments, match_template, Api, ApiNode};
