//! Builders for declaring an API tree.
//!
//! Nothing here is validated; [`Api::define`](crate::Api::define) does that
//! once the whole tree is assembled.

use std::fmt;
use std::str::FromStr;

use installrpc::{Annotation, Value};

/// HTTP verb of a declared method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown HTTP verb {s:?}"))
    }
}

/// One declared parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub annotation: Annotation,
    pub default: Option<Value>,
    /// Carried as the JSON request body instead of a query argument.
    pub payload: bool,
}

impl Param {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// An HTTP-verb method on an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub verb: Verb,
    pub params: Vec<Param>,
    pub returns: Annotation,
    /// Served before the start gate opens.
    pub allowed_before_start: bool,
}

impl MethodDef {
    pub fn new(verb: Verb) -> Self {
        Self {
            verb,
            params: Vec::new(),
            returns: Annotation::None,
            allowed_before_start: false,
        }
    }

    pub fn get() -> Self {
        Self::new(Verb::Get)
    }

    pub fn post() -> Self {
        Self::new(Verb::Post)
    }

    pub fn put() -> Self {
        Self::new(Verb::Put)
    }

    pub fn patch() -> Self {
        Self::new(Verb::Patch)
    }

    pub fn delete() -> Self {
        Self::new(Verb::Delete)
    }

    pub fn param(self, name: impl Into<String>, annotation: Annotation) -> Self {
        self.push(name.into(), annotation, None, false)
    }

    pub fn param_with_default(
        self,
        name: impl Into<String>,
        annotation: Annotation,
        default: impl Into<Value>,
    ) -> Self {
        self.push(name.into(), annotation, Some(default.into()), false)
    }

    /// Declare the request body parameter.
    pub fn payload(self, name: impl Into<String>, annotation: Annotation) -> Self {
        self.push(name.into(), annotation, None, true)
    }

    pub fn returns(mut self, annotation: Annotation) -> Self {
        self.returns = annotation;
        self
    }

    pub fn allowed_before_start(mut self) -> Self {
        self.allowed_before_start = true;
        self
    }

    fn push(
        mut self,
        name: String,
        annotation: Annotation,
        default: Option<Value>,
        payload: bool,
    ) -> Self {
        self.params.push(Param {
            name,
            annotation,
            default,
            payload,
        });
        self
    }

    pub fn payload_param(&self) -> Option<&Param> {
        self.params.iter().find(|p| p.payload)
    }

    pub fn query_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| !p.payload)
    }
}

/// A node of an API tree under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub(crate) name: String,
    pub(crate) path_parameter: bool,
    pub(crate) serialize_query_args: Option<bool>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) children: Vec<Endpoint>,
}

impl Endpoint {
    /// The root of a tree. Its name appears in qualified names but not in
    /// paths or handler keys.
    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_parameter: false,
            serialize_query_args: None,
            methods: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A wildcard path segment, passed to every method below it as a string
    /// argument named `name`.
    pub fn path_parameter(name: impl Into<String>) -> Self {
        Self {
            path_parameter: true,
            ..Self::new(name)
        }
    }

    pub fn child(mut self, child: Endpoint) -> Self {
        self.children.push(child);
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(method);
        self
    }

    /// Whether query arguments are JSON-encoded (`true`) or raw strings.
    /// Unset nodes inherit from their parent; the root defaults to `true`.
    pub fn serialize_query_args(mut self, serialize: bool) -> Self {
        self.serialize_query_args = Some(serialize);
        self
    }
}

/// `GET() -> T` plus `POST(data: T)`, the shape most installer models use.
pub fn simple_endpoint(name: impl Into<String>, annotation: Annotation) -> Endpoint {
    Endpoint::new(name)
        .method(MethodDef::get().returns(annotation.clone()))
        .method(MethodDef::post().payload("data", annotation))
}
