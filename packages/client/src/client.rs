//! A client that mirrors an API tree.
//!
//! ```ignore
//! let client = Client::new(api, UnixTransport::new("/run/installrpc.sock"));
//! let status = client.at("meta")?.at("status")?.call(Verb::Get, Call::new()).await?;
//! let data = client.param("value")?.call(Verb::Get, Call::new().kwarg("arg", 2)).await?;
//! ```

use std::sync::Arc;

use installrpc::{Serializer, Typed, Value};
use installrpc_api::headers::{X_ERROR_MSG, X_ERROR_TYPE};
use installrpc_api::{Api, ApiNode, MethodDef, Param, Verb};
use tracing::debug;

use crate::error::ClientError;
use crate::hooks::ResponseHook;
use crate::transport::{RpcRequest, RpcResponse, Transport};

type HeaderFn = dyn Fn() -> Vec<(String, String)> + Send + Sync;

struct Shared {
    api: Api,
    transport: Arc<dyn Transport>,
    serializer: Serializer,
    hook: Option<Arc<dyn ResponseHook>>,
    header_fn: Option<Arc<HeaderFn>>,
}

pub struct ClientBuilder {
    api: Api,
    transport: Arc<dyn Transport>,
    serializer: Serializer,
    hook: Option<Arc<dyn ResponseHook>>,
    header_fn: Option<Arc<HeaderFn>>,
}

impl ClientBuilder {
    pub fn serializer(mut self, serializer: Serializer) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn response_hook(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Extra headers computed afresh for every request.
    pub fn header_fn(
        mut self,
        f: impl Fn() -> Vec<(String, String)> + Send + Sync + 'static,
    ) -> Self {
        self.header_fn = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Client {
        let template = self.api.root().path().to_string();
        Client {
            shared: Arc::new(Shared {
                api: self.api,
                transport: self.transport,
                serializer: self.serializer,
                hook: self.hook,
                header_fn: self.header_fn,
            }),
            template,
            path_args: Vec::new(),
        }
    }
}

/// Arguments for one call, bound against the method's declared parameters
/// the way a function call would be.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
    raise_for_status: bool,
}

impl Default for Call {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            kwargs: Vec::new(),
            raise_for_status: true,
        }
    }
}

impl Call {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.push((name.into(), value.into()));
        self
    }

    /// Decode the body even when the status is not 2xx.
    pub fn raise_for_status(mut self, raise: bool) -> Self {
        self.raise_for_status = raise;
        self
    }
}

/// A position in the API tree plus the path parameter values collected on
/// the way there. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    template: String,
    path_args: Vec<String>,
}

impl Client {
    pub fn new(api: Api, transport: impl Transport + 'static) -> Self {
        Self::builder(api, transport).build()
    }

    pub fn builder(api: Api, transport: impl Transport + 'static) -> ClientBuilder {
        Self::builder_with(api, Arc::new(transport))
    }

    /// Like [`builder`](Self::builder), for a transport that is already shared.
    pub fn builder_with(api: Api, transport: Arc<dyn Transport>) -> ClientBuilder {
        ClientBuilder {
            api,
            transport,
            serializer: Serializer::new(),
            hook: None,
            header_fn: None,
        }
    }

    fn node(&self) -> &ApiNode {
        // Clients are only ever created at templates found in the tree.
        self.shared
            .api
            .find(&self.template)
            .unwrap_or_else(|| self.shared.api.root())
    }

    /// Qualified name of the node this client points at.
    pub fn qualname(&self) -> &str {
        self.node().qualname()
    }

    /// The named child endpoint.
    pub fn at(&self, name: &str) -> Result<Client, ClientError> {
        let node = self.node();
        let child = node
            .child(name)
            .filter(|c| !c.is_path_parameter())
            .ok_or_else(|| ClientError::UnknownEndpoint {
                node: node.qualname().to_string(),
                name: name.to_string(),
            })?;
        Ok(Client {
            shared: Arc::clone(&self.shared),
            template: child.path().to_string(),
            path_args: self.path_args.clone(),
        })
    }

    /// The path parameter child, with its value fixed.
    pub fn param(&self, value: impl Into<String>) -> Result<Client, ClientError> {
        let node = self.node();
        let child = node
            .path_parameter_child()
            .ok_or_else(|| ClientError::UnknownEndpoint {
                node: node.qualname().to_string(),
                name: "[]".to_string(),
            })?;
        let mut path_args = self.path_args.clone();
        path_args.push(value.into());
        Ok(Client {
            shared: Arc::clone(&self.shared),
            template: child.path().to_string(),
            path_args,
        })
    }

    /// Call `verb` on this endpoint and decode the result.
    pub async fn call(&self, verb: Verb, call: Call) -> Result<Value, ClientError> {
        let raise = call.raise_for_status;
        let node = self.node();
        let method = node.method(verb).ok_or_else(|| ClientError::NoMethod {
            node: node.qualname().to_string(),
            verb: verb.to_string(),
        })?;
        let resp = self.send(node, method, call).await?;
        if raise && !resp.is_success() {
            return Err(ClientError::Server {
                status: resp.status,
                error_type: resp.header(X_ERROR_TYPE).map(str::to_string),
                message: resp
                    .header(X_ERROR_MSG)
                    .map(str::to_string)
                    .unwrap_or_else(|| resp.text()),
            });
        }
        let json = resp.json()?;
        Ok(self.shared.serializer.deserialize(&method.returns, &json)?)
    }

    /// [`call`](Self::call), converting the result to a Rust type.
    pub async fn call_typed<T: Typed>(&self, verb: Verb, call: Call) -> Result<T, ClientError> {
        let value = self.call(verb, call).await?;
        Ok(T::from_value(value)?)
    }

    async fn send(
        &self,
        node: &ApiNode,
        method: &MethodDef,
        call: Call,
    ) -> Result<RpcResponse, ClientError> {
        let qualname = node.method_qualname(method.verb);
        let bound = bind_call(&qualname, method, call)?;
        let serializer = &self.shared.serializer;

        let mut query = Vec::new();
        let mut body = None;
        for (param, value) in bound {
            if param.payload {
                body = Some(serializer.serialize(&param.annotation, &value)?.to_string());
            } else if node.serialize_query_args() {
                query.push((&param.name, serializer.to_json(&param.annotation, &value)?));
            } else {
                let raw = value.as_str().map(str::to_string).ok_or_else(|| {
                    installrpc::SerializationError::new(
                        format!(".{}", param.name),
                        format!("expected str, found {}", value.kind()),
                    )
                })?;
                query.push((&param.name, raw));
            }
        }

        let mut path = fill_template(node.path(), &self.path_args);
        if !query.is_empty() {
            let qs: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            path = format!("{path}?{}", qs.join("&"));
        }
        let headers = self
            .shared
            .header_fn
            .as_ref()
            .map(|f| f())
            .unwrap_or_default();

        debug!(method = %qualname, %path, "calling");
        let resp = self
            .shared
            .transport
            .request(RpcRequest {
                verb: method.verb,
                path,
                headers,
                body: body.map(String::into_bytes),
            })
            .await?;
        if let Some(hook) = &self.shared.hook {
            hook.on_response(&resp)?;
        }
        Ok(resp)
    }
}

/// Match positional and keyword arguments to parameters. Parameters that were
/// not given are left out entirely, so the server applies its own defaults.
fn bind_call<'m>(
    qualname: &str,
    method: &'m MethodDef,
    call: Call,
) -> Result<Vec<(&'m Param, Value)>, ClientError> {
    let params = &method.params;
    if call.args.len() > params.len() {
        return Err(ClientError::TooManyArguments {
            method: qualname.to_string(),
            max: params.len(),
            given: call.args.len(),
        });
    }
    let mut slots: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, value) in slots.iter_mut().zip(call.args) {
        *slot = Some(value);
    }
    for (name, value) in call.kwargs {
        let idx = params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ClientError::UnknownArgument {
                method: qualname.to_string(),
                name: name.clone(),
            })?;
        if slots[idx].is_some() {
            return Err(ClientError::DuplicateArgument {
                method: qualname.to_string(),
                name,
            });
        }
        slots[idx] = Some(value);
    }

    let mut bound = Vec::new();
    for (param, slot) in params.iter().zip(slots) {
        match slot {
            Some(value) => bound.push((param, value)),
            None if param.is_required() => {
                return Err(ClientError::MissingArgument {
                    method: qualname.to_string(),
                    name: param.name.clone(),
                })
            }
            None => {}
        }
    }
    Ok(bound)
}

/// Substitute path parameter values, in order, into `{...}` segments.
fn fill_template(template: &str, values: &[String]) -> String {
    let mut values = values.iter();
    let segments: Vec<String> = template
        .split('/')
        .map(|seg| {
            if seg.starts_with('{') && seg.ends_with('}') {
                values
                    .next()
                    .map(|v| urlencoding::encode(v).into_owned())
                    .unwrap_or_default()
            } else {
                seg.to_string()
            }
        })
        .collect();
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};
    use installrpc::Annotation;
    use installrpc_api::Endpoint;
    use serde_json::json;

    use crate::hooks::status_hook;
    use crate::transport::TransportError;

    /// Records requests and answers with a canned response.
    struct FakeTransport {
        seen: Arc<Mutex<Vec<RpcRequest>>>,
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn request(&self, req: RpcRequest) -> Result<RpcResponse, TransportError> {
            self.seen.lock().unwrap().push(req);
            let mut headers = HeaderMap::new();
            for (k, v) in &self.headers {
                headers.insert(*k, HeaderValue::from_static(v));
            }
            Ok(RpcResponse {
                status: self.status,
                headers,
                body: Bytes::from_static(self.body.as_bytes()),
            })
        }
    }

    fn api() -> Api {
        Api::define(
            Endpoint::root("API")
                .method(MethodDef::get().returns(Annotation::Str))
                .child(
                    Endpoint::new("meth").method(
                        MethodDef::get()
                            .param("arg1", Annotation::Str)
                            .param_with_default("arg2", Annotation::Int, 0)
                            .returns(Annotation::Str),
                    ),
                )
                .child(
                    Endpoint::new("raw")
                        .serialize_query_args(false)
                        .method(MethodDef::get().param("arg", Annotation::Str)),
                )
                .child(
                    Endpoint::new("post").method(
                        MethodDef::post()
                            .payload("data", Annotation::dict())
                            .returns(Annotation::dict()),
                    ),
                )
                .child(Endpoint::path_parameter("param").method(
                    MethodDef::get().param("arg", Annotation::Int).returns(Annotation::Str),
                )),
        )
        .unwrap()
    }

    fn client(body: &'static str) -> (Client, Arc<Mutex<Vec<RpcRequest>>>) {
        client_with(200, vec![], body)
    }

    fn client_with(
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    ) -> (Client, Arc<Mutex<Vec<RpcRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = FakeTransport {
            seen: Arc::clone(&seen),
            status,
            headers,
            body,
        };
        let client = Client::builder(api(), transport)
            .response_hook(status_hook())
            .header_fn(|| vec![("x-make-view-request".into(), "yes".into())])
            .build();
        (client, seen)
    }

    fn last(seen: &Arc<Mutex<Vec<RpcRequest>>>) -> RpcRequest {
        seen.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn root_get() {
        let (client, seen) = client("\"value\"");
        let v = client.call(Verb::Get, Call::new()).await.unwrap();
        assert_eq!(v, Value::from("value"));
        let req = last(&seen);
        assert_eq!(req.path, "/");
        assert_eq!(req.body, None);
        assert_eq!(req.headers, vec![("x-make-view-request".to_string(), "yes".to_string())]);
    }

    #[tokio::test]
    async fn only_given_arguments_are_sent() {
        let (client, seen) = client("\"x\"");
        let meth = client.at("meth").unwrap();
        meth.call(Verb::Get, Call::new().arg("a")).await.unwrap();
        assert_eq!(last(&seen).path, "/meth?arg1=%22a%22");

        meth.call(Verb::Get, Call::new().arg("a").kwarg("arg2", 3))
            .await
            .unwrap();
        assert_eq!(last(&seen).path, "/meth?arg1=%22a%22&arg2=3");
    }

    #[tokio::test]
    async fn argument_binding_errors() {
        let (client, seen) = client("\"x\"");
        let meth = client.at("meth").unwrap();
        let cases = [
            Call::new(),
            Call::new().arg("a").arg(1).arg(2),
            Call::new().arg("a").kwarg("arg1", "b"),
            Call::new().kwarg("nope", 1),
        ];
        let errs: Vec<ClientError> = {
            let mut out = Vec::new();
            for c in cases {
                out.push(meth.call(Verb::Get, c).await.unwrap_err());
            }
            out
        };
        assert!(matches!(&errs[0], ClientError::MissingArgument { name, .. } if name == "arg1"));
        assert!(matches!(&errs[1], ClientError::TooManyArguments { max: 2, given: 3, .. }));
        assert!(matches!(&errs[2], ClientError::DuplicateArgument { name, .. } if name == "arg1"));
        assert!(matches!(&errs[3], ClientError::UnknownArgument { name, .. } if name == "nope"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn raw_query_args_are_not_quoted() {
        let (client, seen) = client("null");
        client
            .at("raw")
            .unwrap()
            .call(Verb::Get, Call::new().arg("a b"))
            .await
            .unwrap();
        assert_eq!(last(&seen).path, "/raw?arg=a%20b");
    }

    #[tokio::test]
    async fn payload_becomes_the_body() {
        let (client, seen) = client("{\"key\": \"value\"}");
        let data = Value::map([("key", "value")]);
        let v = client
            .at("post")
            .unwrap()
            .call(Verb::Post, Call::new().arg(data))
            .await
            .unwrap();
        let req = last(&seen);
        assert_eq!(req.path, "/post");
        let body: serde_json::Value = serde_json::from_slice(&req.body.unwrap()).unwrap();
        assert_eq!(body, json!({"key": "value"}));
        assert_eq!(v.get("key"), Some(&Value::any(json!("value"))));
    }

    #[tokio::test]
    async fn path_parameters_are_filled_in() {
        let (client, seen) = client("\"value2\"");
        let got: String = client
            .param("a value")
            .unwrap()
            .call_typed(Verb::Get, Call::new().arg(2))
            .await
            .unwrap();
        assert_eq!(got, "value2");
        assert_eq!(last(&seen).path, "/a%20value?arg=2");
    }

    #[tokio::test]
    async fn navigation_errors() {
        let (client, _) = client("null");
        assert!(matches!(client.at("missing"), Err(ClientError::UnknownEndpoint { .. })));
        assert!(matches!(
            client.at("meth").unwrap().param("x"),
            Err(ClientError::UnknownEndpoint { .. })
        ));
        assert!(matches!(
            client.call(Verb::Delete, Call::new()).await,
            Err(ClientError::NoMethod { .. })
        ));
        assert_eq!(client.at("meth").unwrap().qualname(), "API.meth");
    }

    #[tokio::test]
    async fn server_errors_carry_headers() {
        let (client, _) = client_with(
            500,
            vec![("x-error-type", "TypeError"), ("x-status", "error")],
            "missing required argument \"arg1\"",
        );
        match client.call(Verb::Get, Call::new()).await {
            Err(ClientError::Server {
                status,
                error_type,
                message,
            }) => {
                assert_eq!(status, 500);
                assert_eq!(error_type.as_deref(), Some("TypeError"));
                assert_eq!(message, "missing required argument \"arg1\"");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_is_raised_before_decoding() {
        let (client, _) = client_with(200, vec![("x-status", "skip")], "");
        assert!(matches!(
            client.call(Verb::Get, Call::new()).await,
            Err(ClientError::Skip)
        ));
    }

    #[test]
    fn templates_are_filled_in_order() {
        assert_eq!(
            fill_template("/{p1}/{p2}/more", &["a".into(), "b/c".into()]),
            "/a/b%2Fc/more"
        );
        assert_eq!(fill_template("/", &[]), "/");
    }
}
