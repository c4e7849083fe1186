//! Shared helpers for the installer RPC conformance suite.
//!
//! [`TestServer`] binds controllers to an API in-process and produces the
//! same router the server binary would serve. [`spawn_tcp`] and
//! [`spawn_unix`] put that router behind a real listener on a loopback port
//! or a fresh Unix socket, and [`tcp_client`] / [`unix_client`] return a
//! client builder pointed at it.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use installrpc::Serializer;
use installrpc_api::Api;
use installrpc_client::{Client, ClientBuilder, HttpTransport, UnixTransport};
use installrpc_server::{
    build_router, Application, Binder, Controller, ErrorReporter, StartGate,
};

/// An API plus the controllers bound to it, not yet serving.
pub struct TestServer {
    api: Api,
    binder: Binder,
    app: Arc<Application>,
    reporter: Arc<ErrorReporter>,
    start: bool,
    updated: bool,
}

impl TestServer {
    pub fn new(api: &Api) -> Self {
        Self::with_serializer(api, Serializer::new())
    }

    pub fn with_serializer(api: &Api, serializer: Serializer) -> Self {
        let app = Arc::new(Application::new(Arc::new(StartGate::new()), Some(true)));
        Self {
            api: api.clone(),
            binder: Binder::new(serializer, app.gate()),
            app,
            reporter: Arc::new(ErrorReporter::new()),
            start: true,
            updated: false,
        }
    }

    /// Bind `controller` at the node whose path template is `template`.
    ///
    /// # Panics
    ///
    /// Panics if no node has that template or the binding is rejected.
    pub fn bind(mut self, template: &str, controller: Controller) -> Self {
        let node = self
            .api
            .find(template)
            .unwrap_or_else(|| panic!("no endpoint at {template}"));
        if let Err(e) = self.binder.bind(node, Arc::new(controller)) {
            panic!("binding {template}: {e}");
        }
        self
    }

    /// Leave the start gate closed; open it later via [`Application::controllers_started`].
    pub fn deferred_start(mut self) -> Self {
        self.start = false;
        self
    }

    /// Report `x-updated: yes`.
    pub fn updated(mut self) -> Self {
        self.updated = true;
        self
    }

    pub fn app(&self) -> Arc<Application> {
        Arc::clone(&self.app)
    }

    pub fn reporter(&self) -> Arc<ErrorReporter> {
        Arc::clone(&self.reporter)
    }

    pub fn router(self) -> Router {
        if self.start {
            self.app.controllers_started(false);
        }
        build_router(self.binder, self.updated, &self.app, self.reporter)
    }
}

/// Serve `router` on an OS-assigned loopback port; returns the base URL,
/// e.g. `http://127.0.0.1:51234`.
///
/// # Panics
///
/// Panics if the listener cannot be bound.
pub async fn spawn_tcp(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("conformance server error");
    });
    format!("http://{addr}")
}

/// Serve `router` on a socket inside a fresh temporary directory. The
/// directory is removed when the server task is dropped, at the latest when
/// the test's runtime shuts down.
///
/// # Panics
///
/// Panics if the directory or the socket cannot be created.
pub async fn spawn_unix(router: Router) -> PathBuf {
    let dir = tempfile::Builder::new()
        .prefix("installrpc-")
        .tempdir()
        .expect("create socket dir");
    let path = dir.path().join("server.sock");
    let listener = tokio::net::UnixListener::bind(&path).expect("bind unix socket");
    tokio::spawn(async move {
        let _dir = dir;
        axum::serve(listener, router)
            .await
            .expect("conformance server error");
    });
    path
}

/// A client builder for `api`, talking to a fresh TCP server.
///
/// # Panics
///
/// Panics if the server cannot be spawned.
pub async fn tcp_client(api: &Api, router: Router) -> ClientBuilder {
    let base = spawn_tcp(router).await;
    let transport = HttpTransport::new(&base).expect("loopback transport");
    Client::builder(api.clone(), transport)
}

/// A client builder for `api`, talking to a fresh Unix socket server.
pub async fn unix_client(api: &Api, router: Router) -> ClientBuilder {
    let path = spawn_unix(router).await;
    Client::builder(api.clone(), UnixTransport::new(path))
}
