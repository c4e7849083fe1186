//! End-to-end tests: a real server on a loopback port or Unix socket, driven
//! by the typed client.
//!
//! | Area | Tests |
//! |------|-------|
//! | Dispatch | `simple`, `simple_over_unix`, `nested`, `args_and_kwargs`, `defaults` |
//! | Harness | `unix_socket_dir_is_removed_with_the_runtime` |
//! | Path parameters | `two_path_parameters`, `only_one_path_parameter`, `path_parameter_with_json_query` |
//! | Payloads | `post_dict`, `typed_record_round_trip`, `compact_serializer` |
//! | Status headers | `middleware_skip`, `view_request_skips_non_interactive`, `error_report_aborts` |
//! | Errors | `error_without_hook`, `error_middleware_and_custom_hook`, `missing_argument` |
//! | Meta | `meta_status_and_confirm`, `deferred_start` |

use std::time::Duration;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use installrpc::{Annotation, Field, Record, RecordDef, Serializer, Typed, Value};
use installrpc_api::{Api, ApiDefinitionError, Endpoint, MethodDef, Verb};
use installrpc_client::{
    status_hook, Call, ClientError, HttpTransport, RpcRequest, RpcResponse, Transport,
};
use installrpc_conformance::{spawn_tcp, spawn_unix, tcp_client, unix_client, TestServer};
use installrpc_server::meta::{self, ApplicationState};
use installrpc_server::{AppError, Args, Controller, Failure, Handler};
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn constant(value: &'static str) -> Handler {
    Handler::new(move |_args: Args| async move { Ok::<_, AppError>(value.to_string()) })
}

/// Joins every named string argument with `+`.
fn join(names: &'static [&'static str]) -> Handler {
    let handler = Handler::new(move |mut args: Args| async move {
        let mut parts = Vec::new();
        for name in names {
            parts.push(args.take_as::<String>(name)?);
        }
        Ok::<_, AppError>(parts.join("+"))
    });
    names
        .iter()
        .fold(handler, |h, name| h.param(*name, Annotation::Str))
}

fn str_get(params: &[&str]) -> MethodDef {
    params
        .iter()
        .fold(MethodDef::get(), |m, p| m.param(*p, Annotation::Str))
        .returns(Annotation::Str)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn simple() {
    let api = Api::define(Endpoint::root("API").method(str_get(&[]))).unwrap();
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("GET", constant("value")))
        .router();
    let client = tcp_client(&api, router).await.build();
    let value = client.call(Verb::Get, Call::new()).await.unwrap();
    assert_eq!(value, Value::from("value"));
}

#[tokio::test]
async fn simple_over_unix() {
    let api = Api::define(Endpoint::root("API").method(str_get(&[]))).unwrap();
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("GET", constant("value")))
        .router();
    let client = unix_client(&api, router).await.build();
    let value: String = client.call_typed(Verb::Get, Call::new()).await.unwrap();
    assert_eq!(value, "value");
}

#[test]
fn unix_socket_dir_is_removed_with_the_runtime() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let path = rt.block_on(spawn_unix(axum::Router::new()));
    assert!(path.exists());
    let dir = path.parent().unwrap().to_path_buf();
    drop(rt);
    assert!(!dir.exists(), "{} left behind", dir.display());
}

#[tokio::test]
async fn nested() {
    let api = Api::define(Endpoint::root("API").child(
        Endpoint::new("endpoint").child(Endpoint::new("nested").method(str_get(&[]))),
    ))
    .unwrap();
    let router = TestServer::new(&api)
        .bind(
            "/",
            Controller::new("Impl").on("endpoint_nested_GET", constant("value")),
        )
        .router();
    let client = tcp_client(&api, router).await.build();
    let value = client
        .at("endpoint")
        .unwrap()
        .at("nested")
        .unwrap()
        .call(Verb::Get, Call::new())
        .await
        .unwrap();
    assert_eq!(value, Value::from("value"));
}

#[tokio::test]
async fn args_and_kwargs() {
    let api = Api::define(Endpoint::root("API").method(str_get(&["arg1", "arg2"]))).unwrap();
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("GET", join(&["arg1", "arg2"])))
        .router();
    let client = tcp_client(&api, router).await.build();
    let value = client
        .call(Verb::Get, Call::new().arg("A").kwarg("arg2", "B"))
        .await
        .unwrap();
    assert_eq!(value, Value::from("A+B"));
}

#[tokio::test]
async fn defaults() {
    let api = Api::define(
        Endpoint::root("API").method(
            MethodDef::get()
                .param_with_default("arg1", Annotation::Str, "arg1")
                .param_with_default("arg2", Annotation::Str, "arg2")
                .returns(Annotation::Str),
        ),
    )
    .unwrap();
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("GET", join(&["arg1", "arg2"])))
        .router();
    let client = tcp_client(&api, router).await.build();
    let first = client.call(Verb::Get, Call::new().arg("A")).await.unwrap();
    assert_eq!(first, Value::from("A+arg2"));
    let second = client
        .call(Verb::Get, Call::new().kwarg("arg2", "B"))
        .await
        .unwrap();
    assert_eq!(second, Value::from("arg1+B"));
}

// ---------------------------------------------------------------------------
// Path parameters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_path_parameters() {
    let api = Api::define(Endpoint::root("API").child(
        Endpoint::path_parameter("param1").child(
            Endpoint::path_parameter("param2").method(str_get(&["arg1", "arg2"])),
        ),
    ))
    .unwrap();
    let router = TestServer::new(&api)
        .bind(
            "/",
            Controller::new("Impl").on(
                "param1_param2_GET",
                join(&["param1", "param2", "arg1", "arg2"]),
            ),
        )
        .router();
    let client = tcp_client(&api, router).await.build();
    let value = client
        .param("1")
        .unwrap()
        .param("2")
        .unwrap()
        .call(Verb::Get, Call::new().arg("A").kwarg("arg2", "B"))
        .await
        .unwrap();
    assert_eq!(value, Value::from("1+2+A+B"));
}

#[test]
fn only_one_path_parameter() {
    let err = Api::define(
        Endpoint::root("API")
            .child(Endpoint::path_parameter("param1").method(str_get(&[])))
            .child(Endpoint::path_parameter("param2").method(str_get(&[]))),
    )
    .unwrap_err();
    assert!(
        matches!(err, ApiDefinitionError::MultiplePathParameters { .. }),
        "{err}"
    );
}

#[tokio::test]
async fn path_parameter_with_json_query() {
    let api = Api::define(Endpoint::root("API").child(
        Endpoint::path_parameter("param").method(
            MethodDef::get()
                .param("arg", Annotation::Int)
                .returns(Annotation::Str),
        ),
    ))
    .unwrap();
    let h = Handler::new(|mut args: Args| async move {
        let param: String = args.take_as("param")?;
        let arg: i64 = args.take_as("arg")?;
        Ok::<_, AppError>(format!("{param}{arg}"))
    })
    .param("param", Annotation::Str)
    .param("arg", Annotation::Int);
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("param_GET", h))
        .router();
    let client = tcp_client(&api, router).await.build();
    let value = client
        .param("a value")
        .unwrap()
        .call(Verb::Get, Call::new().kwarg("arg", 2))
        .await
        .unwrap();
    assert_eq!(value, Value::from("a value2"));
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn post_dict() {
    let api = Api::define(
        Endpoint::root("API").method(
            MethodDef::post()
                .payload("data", Annotation::dict())
                .returns(Annotation::Any),
        ),
    )
    .unwrap();
    let h = Handler::new(|mut args: Args| async move {
        let data = args.take("data")?;
        data.get("key")
            .cloned()
            .ok_or_else(|| AppError::controller("KeyError", "key"))
    })
    .param("data", Annotation::dict());
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("POST", h))
        .router();
    let client = tcp_client(&api, router).await.build();
    let value = client
        .call(
            Verb::Post,
            Call::new().arg(Value::map([("key", "value")])),
        )
        .await
        .unwrap();
    assert_eq!(value, Value::any(json!("value")));
}

fn doubler_api() -> Api {
    let input = Annotation::record(RecordDef::new("In").field(Field::new("val", Annotation::Int)));
    let output = Annotation::record(
        RecordDef::new("Out").field(Field::new("doubled", Annotation::Int)),
    );
    Api::define(
        Endpoint::root("API").child(
            Endpoint::new("doubler")
                .method(MethodDef::post().payload("data", input).returns(output)),
        ),
    )
    .unwrap()
}

fn doubler() -> Controller {
    let input = Annotation::record(RecordDef::new("In").field(Field::new("val", Annotation::Int)));
    let h = Handler::new(|mut args: Args| async move {
        let data = args.take("data")?;
        let val = data
            .get("val")
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::controller("ValueError", "val"))?;
        Ok::<_, AppError>(Value::from(Record::new("Out").with("doubled", val * 2)))
    })
    .param("data", input);
    Controller::new("Doubler").on("doubler_POST", h)
}

#[tokio::test]
async fn typed_record_round_trip() {
    let api = doubler_api();
    let router = TestServer::new(&api).bind("/", doubler()).router();
    let client = tcp_client(&api, router).await.build();
    let out = client
        .at("doubler")
        .unwrap()
        .call(
            Verb::Post,
            Call::new().arg(Record::new("In").with("val", 21)),
        )
        .await
        .unwrap();
    assert_eq!(out.get("doubled").and_then(Value::as_i64), Some(42));
}

#[tokio::test]
async fn compact_serializer() {
    let api = doubler_api();
    let ser = Serializer::new().compact(true);
    let router = TestServer::with_serializer(&api, ser)
        .bind("/", doubler())
        .router();
    let client = unix_client(&api, router).await.serializer(ser).build();
    let out = client
        .at("doubler")
        .unwrap()
        .call(Verb::Post, Call::new().arg(Record::new("In").with("val", 4)))
        .await
        .unwrap();
    assert_eq!(out.get("doubled").and_then(Value::as_i64), Some(8));
}

// ---------------------------------------------------------------------------
// Status headers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn middleware_skip() {
    let api = Api::define(Endpoint::root("API").method(str_get(&[]))).unwrap();
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("GET", constant("value")))
        .router()
        .layer(from_fn(|_req: Request, _next: Next| async {
            let mut resp = ().into_response();
            resp.headers_mut()
                .insert("x-status", HeaderValue::from_static("skip"));
            resp
        }));
    let client = tcp_client(&api, router)
        .await
        .response_hook(status_hook())
        .build();
    let err = client.call(Verb::Get, Call::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::Skip), "{err:?}");
}

#[tokio::test]
async fn view_request_skips_non_interactive() {
    let api = Api::define(
        Endpoint::root("API").child(Endpoint::new("view").method(str_get(&[]))),
    )
    .unwrap();
    let router = TestServer::new(&api)
        .bind(
            "/view",
            Controller::new("View")
                .on("GET", constant("value"))
                .interactive(false),
        )
        .router();
    let client = tcp_client(&api, router)
        .await
        .response_hook(status_hook())
        .header_fn(|| vec![("x-make-view-request".to_string(), "yes".to_string())])
        .build();
    let err = client
        .at("view")
        .unwrap()
        .call(Verb::Get, Call::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Skip), "{err:?}");
}

fn good_and_bad() -> (Api, TestServer) {
    let api = Api::define(
        Endpoint::root("API")
            .child(Endpoint::new("good").method(MethodDef::get().returns(Annotation::Int)))
            .child(
                Endpoint::new("bad").method(
                    MethodDef::get()
                        .param("x", Annotation::Int)
                        .returns(Annotation::Int),
                ),
            ),
    )
    .unwrap();
    let good = Handler::new(|_args: Args| async { Ok::<_, AppError>(3i64) });
    let bad = Handler::new(|_args: Args| async {
        Err::<i64, _>(AppError::controller("Exception", "baz"))
    })
    .param("x", Annotation::Int);
    let server = TestServer::new(&api).bind(
        "/",
        Controller::new("Impl")
            .on("good_GET", good)
            .on("bad_GET", bad),
    );
    (api, server)
}

#[tokio::test]
async fn error_report_aborts() {
    let (api, server) = good_and_bad();
    let reporter = server.reporter();
    let client = tcp_client(&api, server.router())
        .await
        .response_hook(status_hook())
        .build();

    let good = client.at("good").unwrap();
    assert_eq!(good.call(Verb::Get, Call::new()).await.unwrap(), Value::from(3i64));

    let err = client
        .at("bad")
        .unwrap()
        .call(Verb::Get, Call::new().arg(2i64))
        .await
        .unwrap_err();
    let ClientError::Abort(reference) = err else {
        panic!("expected abort, got {err:?}");
    };
    let report = reporter.get(&reference.base).expect("report filed");
    assert_eq!(report.description, "request to /bad?x=2");
    assert_eq!(report.error_type, "Exception");
    assert_eq!(report.message, "baz");
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_without_hook() {
    let (api, server) = good_and_bad();
    let client = tcp_client(&api, server.router()).await.build();
    let err = client
        .at("bad")
        .unwrap()
        .call(Verb::Get, Call::new().arg(2i64))
        .await
        .unwrap_err();
    match err {
        ClientError::Server {
            status,
            error_type,
            message,
        } => {
            assert_eq!(status, 500);
            assert_eq!(error_type.as_deref(), Some("Exception"));
            assert_eq!(message, "baz");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn error_middleware_and_custom_hook() {
    let (api, server) = good_and_bad();
    let router = server.router().layer(from_fn(|req: Request, next: Next| async move {
        let mut resp: Response = next.run(req).await;
        if resp.extensions().get::<Failure>().is_some() {
            resp.headers_mut()
                .insert("x-status", HeaderValue::from_static("ERROR"));
        }
        resp
    }));
    let hook = |resp: &RpcResponse| {
        if resp.header("x-status") == Some("ERROR") {
            Err(ClientError::Server {
                status: resp.status,
                error_type: Some("Abort".to_string()),
                message: "aborted by hook".to_string(),
            })
        } else {
            Ok(())
        }
    };
    let client = tcp_client(&api, router).await.response_hook(hook).build();

    let good = client.at("good").unwrap();
    assert_eq!(good.call(Verb::Get, Call::new()).await.unwrap(), Value::from(3i64));

    let err = client
        .at("bad")
        .unwrap()
        .call(Verb::Get, Call::new().arg(2i64))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, ClientError::Server { message, .. } if message == "aborted by hook"),
        "{err:?}"
    );
}

#[tokio::test]
async fn missing_argument() {
    let api = Api::define(Endpoint::root("API").child(
        Endpoint::new("meth").method(str_get(&["arg"])),
    ))
    .unwrap();
    let router = TestServer::new(&api)
        .bind("/", Controller::new("Impl").on("meth_GET", join(&["arg"])))
        .router();
    let base = spawn_tcp(router).await;
    let transport = HttpTransport::new(&base).unwrap();
    let resp = transport
        .request(RpcRequest {
            verb: Verb::Get,
            path: "/meth".to_string(),
            headers: Vec::new(),
            body: None,
        })
        .await
        .unwrap();
    assert_eq!(resp.status, 500);
    assert_eq!(resp.header("x-error-type"), Some("TypeError"));
    assert!(resp.header("x-error-msg").unwrap_or("").contains("arg"));
}

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

#[tokio::test]
async fn meta_status_and_confirm() {
    let api = meta::api().unwrap();
    let server = TestServer::new(&api).deferred_start();
    let app = server.app();
    let router = server.bind("/meta", app.controller()).router();
    let client = tcp_client(&api, router).await.build();
    let meta = client.at("meta").unwrap();

    let status = meta
        .at("status")
        .unwrap()
        .call(Verb::Get, Call::new())
        .await
        .unwrap();
    let state = status.get("state").cloned().unwrap();
    assert_eq!(
        ApplicationState::from_value(state).unwrap(),
        ApplicationState::StartingUp
    );

    // Gated until the controllers have started.
    let confirm = meta.at("confirm").unwrap();
    let pending = tokio::spawn(async move {
        confirm
            .call(Verb::Post, Call::new().kwarg("tty", "/dev/tty1"))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());

    app.controllers_started(true);
    pending.await.unwrap().unwrap();
    assert_eq!(app.state(), ApplicationState::Running);
    assert_eq!(app.confirming_tty(), "/dev/tty1");
}

#[tokio::test]
async fn deferred_start() {
    let api = meta::api().unwrap();
    let server = TestServer::new(&api).deferred_start();
    let app = server.app();
    let router = server.bind("/meta", app.controller()).router();
    let client = unix_client(&api, router).await.build();
    let status = client.at("meta").unwrap().at("status").unwrap();

    let poll = {
        let status = status.clone();
        tokio::spawn(async move {
            status
                .call(
                    Verb::Get,
                    Call::new().kwarg("cur", ApplicationState::StartingUp.into_value()),
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!poll.is_finished());

    app.controllers_started(false);
    let value = poll.await.unwrap().unwrap();
    let state = value.get("state").cloned().unwrap();
    assert_eq!(
        ApplicationState::from_value(state).unwrap(),
        ApplicationState::Waiting
    );
}
