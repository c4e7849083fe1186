//! Controllers: named groups of handlers registered by key.
//!
//! A handler is registered under `<prefix>_<VERB>`, where the prefix is the
//! path from the node the controller is bound at, e.g. `GET`, `nested_GET`
//! or `param1_param2_GET`. Each handler declares its parameters; the
//! [`Binder`](crate::Binder) checks them against the API at bind time.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use installrpc::{Annotation, SerializationError, Typed, Value};

use crate::error::AppError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send>>;
type HandlerFn = dyn Fn(Args) -> HandlerFuture + Send + Sync;

/// An async handler plus its declared signature.
#[derive(Clone)]
pub struct Handler {
    params: Vec<(String, Annotation)>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, AppError>> + Send + 'static,
        R: Into<Value> + Send + 'static,
    {
        Self {
            params: Vec::new(),
            func: Arc::new(move |args| -> HandlerFuture {
                let fut = f(args);
                Box::pin(async move { fut.await.map(Into::into) })
            }),
        }
    }

    /// Declare the next parameter. Path parameters come first, then the
    /// method's own parameters (payloads by their inner annotation).
    pub fn param(mut self, name: impl Into<String>, annotation: Annotation) -> Self {
        self.params.push((name.into(), annotation));
        self
    }

    pub fn params(&self) -> &[(String, Annotation)] {
        &self.params
    }

    pub(crate) fn call(&self, args: Args) -> HandlerFuture {
        (self.func)(args)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Arguments handed to a handler, keyed by parameter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Remove and return an argument.
    pub fn take(&mut self, name: &str) -> Result<Value, AppError> {
        let idx = self
            .values
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| AppError::MissingArgument(name.to_string()))?;
        Ok(self.values.remove(idx).1)
    }

    /// Remove an argument and convert it to a Rust type.
    pub fn take_as<T: Typed>(&mut self, name: &str) -> Result<T, AppError> {
        let value = self.take(name)?;
        T::from_value(value).map_err(|e| {
            AppError::Serialization(SerializationError::new(format!(".{name}{}", e.path), e.message))
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A named set of handlers bound to one subtree of an API.
pub struct Controller {
    name: String,
    handlers: HashMap<String, Handler>,
    interactive: AtomicBool,
    postinstall_only: bool,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: HashMap::new(),
            interactive: AtomicBool::new(true),
            postinstall_only: false,
        }
    }

    /// Register `handler` under `key`, e.g. `GET` or `nested_POST`.
    pub fn on(mut self, key: impl Into<String>, handler: Handler) -> Self {
        self.handlers.insert(key.into(), handler);
        self
    }

    pub fn interactive(self, interactive: bool) -> Self {
        self.interactive.store(interactive, Ordering::Relaxed);
        self
    }

    /// The controller's model only matters after installation, so view
    /// requests against it need confirmation first.
    pub fn postinstall_only(mut self, postinstall_only: bool) -> Self {
        self.postinstall_only = postinstall_only;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self, key: &str) -> Option<&Handler> {
        self.handlers.get(key)
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::Relaxed)
    }

    /// Autoinstall answers can make a controller non-interactive at runtime.
    pub fn set_interactive(&self, interactive: bool) {
        self.interactive.store(interactive, Ordering::Relaxed);
    }

    pub fn is_postinstall_only(&self) -> bool {
        self.postinstall_only
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("handlers", &keys)
            .field("interactive", &self.is_interactive())
            .field("postinstall_only", &self.postinstall_only)
            .finish()
    }
}
