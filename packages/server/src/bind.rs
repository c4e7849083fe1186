//! Binding API trees to controllers, and per-request dispatch.
//!
//! [`Binder::bind`] resolves every method in a subtree to a handler on the
//! given [`Controller`], checks the handler's declared parameters against the
//! API, and records the route. All of this happens before the server accepts
//! a connection; a bad binding never reaches a request.
//!
//! At request time each bound method:
//!
//! 1. waits on the start gate unless it is allowed before start;
//! 2. collects path parameters, query arguments and the JSON payload,
//!    deserializing each per its annotation and filling in defaults;
//! 3. calls the handler and serializes its result.
//!
//! Failures become [`AppError`] responses (see [`crate::error`]).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, Path, Query, Request},
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Json, Router,
};
use installrpc::{Annotation, SerializationError, Serializer, Value};
use installrpc_api::headers::{STATUS_OK, X_STATUS};
use installrpc_api::{ApiNode, MethodDef, Param, Verb};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::controller::{Args, Controller, Handler};
use crate::error::{AppError, BindError};
use crate::gate::StartSignal;
use crate::routes::{RouteEntry, RouteTable};

/// Largest request body accepted for a payload.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Collects bindings, then produces the router and route table.
pub struct Binder {
    serializer: Serializer,
    gate: Arc<dyn StartSignal>,
    bound: Vec<Arc<BoundMethod>>,
}

impl Binder {
    pub fn new(serializer: Serializer, gate: Arc<dyn StartSignal>) -> Self {
        Self {
            serializer,
            gate,
            bound: Vec::new(),
        }
    }

    /// Bind every method under `node` to `controller`.
    ///
    /// Handler keys are relative to `node`. Nothing is recorded unless the
    /// whole subtree binds.
    pub fn bind(
        &mut self,
        node: &ApiNode,
        controller: Arc<Controller>,
    ) -> Result<&mut Self, BindError> {
        let mut pending: Vec<Arc<BoundMethod>> = Vec::new();
        for (n, m) in node.walk() {
            let key = n.handler_key_relative_to(node, m.verb);
            let handler = controller
                .handler(&key)
                .ok_or_else(|| BindError::MissingImplementation {
                    methname: key.clone(),
                })?;

            let expected = expected_signature(n, m);
            if handler.params() != expected.as_slice() {
                return Err(BindError::SignatureMismatch {
                    methname: n.method_qualname(m.verb),
                    expected: render_signature(&expected),
                    found: render_signature(handler.params()),
                });
            }

            let taken = self
                .bound
                .iter()
                .chain(pending.iter())
                .any(|b| b.method.verb == m.verb && b.path == n.path());
            if taken {
                return Err(BindError::DuplicateRoute {
                    verb: m.verb.to_string(),
                    path: n.path().to_string(),
                });
            }

            debug!(method = %n.method_qualname(m.verb), path = n.path(), key = %key, "bound");
            pending.push(Arc::new(BoundMethod {
                qualname: n.method_qualname(m.verb),
                path: n.path().to_string(),
                path_params: n.path_params().to_vec(),
                serialize_query_args: n.serialize_query_args(),
                method: m.clone(),
                handler: handler.clone(),
                controller: Arc::clone(&controller),
                serializer: self.serializer,
                gate: Arc::clone(&self.gate),
            }));
        }
        self.bound.extend(pending);
        Ok(self)
    }

    /// Which controller serves which route; share it with middleware.
    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(
            self.bound
                .iter()
                .map(|b| RouteEntry {
                    verb: b.method.verb,
                    template: b.path.clone(),
                    controller: Arc::clone(&b.controller),
                })
                .collect(),
        )
    }

    pub fn into_router(self) -> Router {
        let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
        for b in self.bound {
            let path = b.path.clone();
            let filter = method_filter(b.method.verb);
            let handler = move |req: Request| {
                let b = Arc::clone(&b);
                async move { b.dispatch(req).await }
            };
            let mr = by_path.remove(&path).unwrap_or_else(MethodRouter::new);
            by_path.insert(path, mr.on(filter, handler));
        }
        by_path
            .into_iter()
            .fold(Router::new(), |router, (path, mr)| router.route(&path, mr))
    }
}

/// Path parameters as strings, then the method's parameters.
fn expected_signature(node: &ApiNode, method: &MethodDef) -> Vec<(String, Annotation)> {
    node.path_params()
        .iter()
        .map(|p| (p.clone(), Annotation::Str))
        .chain(
            method
                .params
                .iter()
                .map(|p| (p.name.clone(), p.annotation.clone())),
        )
        .collect()
}

fn render_signature(params: &[(String, Annotation)]) -> String {
    params
        .iter()
        .map(|(name, ann)| format!("{name}: {ann}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn method_filter(verb: Verb) -> MethodFilter {
    match verb {
        Verb::Get => MethodFilter::GET,
        Verb::Post => MethodFilter::POST,
        Verb::Put => MethodFilter::PUT,
        Verb::Patch => MethodFilter::PATCH,
        Verb::Delete => MethodFilter::DELETE,
    }
}

// --- dispatch ----------------------------------------------------------------

struct BoundMethod {
    qualname: String,
    path: String,
    path_params: Vec<String>,
    serialize_query_args: bool,
    method: MethodDef,
    handler: Handler,
    controller: Arc<Controller>,
    serializer: Serializer,
    gate: Arc<dyn StartSignal>,
}

impl BoundMethod {
    async fn dispatch(&self, req: Request) -> Response {
        debug!(method = %self.qualname, controller = self.controller.name(), "dispatching");
        match self.invoke(req).await {
            Ok(json) => {
                let mut resp = Json(json).into_response();
                resp.headers_mut()
                    .insert(X_STATUS, HeaderValue::from_static(STATUS_OK));
                resp
            }
            Err(e) => {
                warn!(method = %self.qualname, error = %e, "request failed");
                e.into_response()
            }
        }
    }

    async fn invoke(&self, req: Request) -> Result<JsonValue, AppError> {
        if !self.method.allowed_before_start && !self.gate.is_set() {
            debug!(method = %self.qualname, "waiting for controllers to start");
            self.gate.wait().await;
        }

        let (mut parts, body) = req.into_parts();
        let mut args = Args::new();

        if !self.path_params.is_empty() {
            let Path(captured) = Path::<Vec<(String, String)>>::from_request_parts(&mut parts, &())
                .await
                .map_err(|e| SerializationError::new("", format!("invalid path parameters: {e}")))?;
            for name in &self.path_params {
                let value = captured
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| {
                        SerializationError::new(format!(".{name}"), "path parameter was not captured")
                    })?;
                args.push(name.clone(), Value::Str(value));
            }
        }

        let Query(query) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map_err(|e| SerializationError::new("", format!("invalid query string: {e}")))?;

        let mut payload = match self.method.payload_param() {
            Some(_) => read_json(body).await?,
            None => None,
        };

        for p in &self.method.params {
            let supplied = if p.payload {
                payload
                    .take()
                    .map(|j| self.serializer.deserialize(&p.annotation, &j))
                    .transpose()
                    .map_err(|e| at_param(&p.name, e))?
            } else {
                query
                    .get(&p.name)
                    .map(|raw| self.query_value(p, raw))
                    .transpose()?
            };
            let value = supplied
                .or_else(|| p.default.clone())
                .ok_or_else(|| AppError::MissingArgument(p.name.clone()))?;
            args.push(p.name.clone(), value);
        }

        let result = self.handler.call(args).await?;
        Ok(self.serializer.serialize(&self.method.returns, &result)?)
    }

    fn query_value(&self, p: &Param, raw: &str) -> Result<Value, AppError> {
        if !self.serialize_query_args {
            return Ok(Value::Str(raw.to_string()));
        }
        let json: JsonValue = serde_json::from_str(raw).map_err(|e| {
            SerializationError::new(format!(".{}", p.name), format!("invalid JSON: {e}"))
        })?;
        self.serializer
            .deserialize(&p.annotation, &json)
            .map_err(|e| at_param(&p.name, e))
    }
}

async fn read_json(body: Body) -> Result<Option<JsonValue>, AppError> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| SerializationError::new("", format!("failed to read body: {e}")))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SerializationError::new("", format!("invalid JSON body: {e}")).into())
}

/// Prefix a serializer error with the parameter it came from.
fn at_param(name: &str, e: SerializationError) -> AppError {
    AppError::Serialization(SerializationError::new(format!(".{name}{}", e.path), e.message))
}
