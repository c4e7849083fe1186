//! Status middleware: view-request overrides, the `x-updated` fingerprint and
//! error-report references for failed requests.
//!
//! For a request carrying `x-make-view-request: yes` the middleware looks up
//! the controller that would serve it. A non-interactive controller answers
//! `x-status: skip` without running the handler; a postinstall-only
//! controller answers `x-status: confirm` while the application still needs
//! confirmation. Every response gets `x-updated: yes|no`. A response carrying
//! a reportable [`Failure`] gets an `x-error-report` header pointing at a
//! freshly filed report.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use installrpc_api::headers::{
    STATUS_CONFIRM, STATUS_SKIP, X_ERROR_REPORT, X_MAKE_VIEW_REQUEST, X_STATUS, X_UPDATED,
};
use installrpc_api::{ErrorReportKind, ErrorReportRef, ErrorReportState};
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{insert_lossy, Failure};
use crate::meta::ApplicationState;
use crate::routes::RouteTable;

// ---------------------------------------------------------------------------
// ErrorReporter
// ---------------------------------------------------------------------------

/// A filed report.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub reference: ErrorReportRef,
    pub description: String,
    pub error_type: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Reports kept by [`ErrorReporter::new`].
pub const DEFAULT_REPORT_CAPACITY: usize = 256;

/// In-memory store of the most recent error reports, keyed by `base`. The
/// oldest report is dropped once `capacity` is reached.
#[derive(Debug)]
pub struct ErrorReporter {
    reports: Mutex<VecDeque<ErrorReport>>,
    capacity: usize,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_REPORT_CAPACITY)
    }
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            reports: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// File a report for `failure` and return its reference.
    pub fn report(
        &self,
        kind: ErrorReportKind,
        description: impl Into<String>,
        failure: &Failure,
    ) -> ErrorReportRef {
        let reference = ErrorReportRef {
            state: ErrorReportState::Done,
            base: Uuid::now_v7().to_string(),
            kind,
            seen: false,
            oops_id: None,
        };
        let report = ErrorReport {
            reference: reference.clone(),
            description: description.into(),
            error_type: failure.error_type.clone(),
            message: failure.message.clone(),
            created_at: Utc::now(),
        };
        debug!(base = %reference.base, kind = kind.title(), "error report filed");
        let mut reports = self.reports.lock().unwrap_or_else(|p| p.into_inner());
        if reports.len() == self.capacity {
            reports.pop_front();
        }
        reports.push_back(report);
        reference
    }

    pub fn get(&self, base: &str) -> Option<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|r| r.reference.base == base)
            .cloned()
    }

    /// Oldest first.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Everything [`status_middleware`] consults.
pub struct StatusContext {
    pub routes: RouteTable,
    /// Sent as `x-updated`.
    pub updated: bool,
    pub state: watch::Receiver<ApplicationState>,
    pub reporter: Arc<ErrorReporter>,
}

impl StatusContext {
    fn view_override(&self, req: &Request) -> Option<&'static str> {
        let is_view = req
            .headers()
            .get(X_MAKE_VIEW_REQUEST)
            .is_some_and(|v| v.as_bytes() == b"yes");
        if !is_view {
            return None;
        }
        let controller = self.routes.controller_for(req.method(), req.uri().path())?;
        if !controller.is_interactive() {
            Some(STATUS_SKIP)
        } else if *self.state.borrow() == ApplicationState::NeedsConfirmation
            && controller.is_postinstall_only()
        {
            Some(STATUS_CONFIRM)
        } else {
            None
        }
    }
}

/// Axum `from_fn` middleware; see the module docs.
pub async fn status_middleware(ctx: Arc<StatusContext>, req: Request, next: Next) -> Response {
    let raw_path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut resp = match ctx.view_override(&req) {
        Some(status) => {
            debug!(path = %raw_path, status, "view request overridden");
            let mut resp = StatusCode::OK.into_response();
            resp.headers_mut()
                .insert(X_STATUS, HeaderValue::from_static(status));
            resp
        }
        None => next.run(req).await,
    };

    let updated = if ctx.updated { "yes" } else { "no" };
    resp.headers_mut()
        .insert(X_UPDATED, HeaderValue::from_static(updated));

    let Some(failure) = resp.extensions().get::<Failure>().cloned() else {
        return resp;
    };
    debug!(
        path = %raw_path,
        status = resp.status().as_u16(),
        error_type = %failure.error_type,
        error = %failure.message,
        "request failed"
    );
    if failure.reportable {
        let reference = ctx.reporter.report(
            ErrorReportKind::ServerRequestFail,
            format!("request to {raw_path}"),
            &failure,
        );
        match serde_json::to_string(&reference) {
            Ok(json) => insert_lossy(resp.headers_mut(), X_ERROR_REPORT, &json),
            Err(e) => warn!(error = %e, "failed to encode error report reference"),
        }
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{body::Body, Router};
    use installrpc::{Annotation, Serializer};
    use installrpc_api::{Api, Endpoint, MethodDef};
    use tower::ServiceExt;

    use crate::bind::Binder;
    use crate::controller::{Args, Controller, Handler};
    use crate::error::AppError;
    use crate::gate::StartGate;

    struct Fixture {
        router: Router,
        state: watch::Sender<ApplicationState>,
        reporter: Arc<ErrorReporter>,
        calls: Arc<AtomicUsize>,
    }

    fn fixture(controller: Controller, updated: bool) -> Fixture {
        let api = Api::define(
            Endpoint::root("API")
                .child(Endpoint::new("view").method(MethodDef::get().returns(Annotation::Str)))
                .child(Endpoint::new("fail").method(MethodDef::get()))
                .child(Endpoint::new("refuse").method(MethodDef::get())),
        )
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let controller = controller
            .on(
                "view_GET",
                Handler::new(move |_args: Args| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, AppError>("viewed") }
                }),
            )
            .on(
                "fail_GET",
                Handler::new(|_args: Args| async {
                    Err::<(), _>(AppError::controller("Exception", "boom"))
                }),
            )
            .on(
                "refuse_GET",
                Handler::new(|_args: Args| async {
                    Err::<(), _>(AppError::recoverable("Bad", "Bad", "no").non_reportable())
                }),
            );

        let gate = StartGate::new();
        gate.set();
        let mut binder = Binder::new(Serializer::new(), Arc::new(gate));
        binder.bind(api.root(), Arc::new(controller)).unwrap();

        let (state, rx) = watch::channel(ApplicationState::Waiting);
        let reporter = Arc::new(ErrorReporter::new());
        let ctx = Arc::new(StatusContext {
            routes: binder.route_table(),
            updated,
            state: rx,
            reporter: Arc::clone(&reporter),
        });
        let router = binder
            .into_router()
            .layer(axum::middleware::from_fn(move |req, next| {
                status_middleware(Arc::clone(&ctx), req, next)
            }));
        Fixture {
            router,
            state,
            reporter,
            calls,
        }
    }

    async fn get(router: &Router, uri: &str, view: bool) -> Response {
        let mut req = axum::http::Request::get(uri);
        if view {
            req = req.header(X_MAKE_VIEW_REQUEST, "yes");
        }
        router
            .clone()
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn non_interactive_views_are_skipped() {
        let f = fixture(Controller::new("Keyboard").interactive(false), false);
        let resp = get(&f.router, "/view", true).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[X_STATUS], STATUS_SKIP);
        assert_eq!(f.calls.load(Ordering::SeqCst), 0);

        // Only view requests are overridden.
        let resp = get(&f.router, "/view", false).await;
        assert_eq!(resp.headers()[X_STATUS], "ok");
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn postinstall_views_need_confirmation() {
        let f = fixture(Controller::new("Ssh").postinstall_only(true), false);
        let resp = get(&f.router, "/view", true).await;
        assert_eq!(resp.headers()[X_STATUS], "ok");

        f.state.send_replace(ApplicationState::NeedsConfirmation);
        let resp = get(&f.router, "/view", true).await;
        assert_eq!(resp.headers()[X_STATUS], STATUS_CONFIRM);
    }

    #[tokio::test]
    async fn updated_is_always_reported() {
        let f = fixture(Controller::new("C"), true);
        assert_eq!(get(&f.router, "/view", false).await.headers()[X_UPDATED], "yes");
        let f = fixture(Controller::new("C"), false);
        assert_eq!(get(&f.router, "/view", false).await.headers()[X_UPDATED], "no");
    }

    #[tokio::test]
    async fn reportable_failures_get_a_report() {
        let f = fixture(Controller::new("C"), false);
        let resp = get(&f.router, "/fail?x=1", false).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let header = resp.headers()[X_ERROR_REPORT].to_str().unwrap().to_string();
        let reference: ErrorReportRef = serde_json::from_str(&header).unwrap();
        assert_eq!(reference.kind, ErrorReportKind::ServerRequestFail);

        let report = f.reporter.get(&reference.base).unwrap();
        assert_eq!(report.description, "request to /fail?x=1");
        assert_eq!(report.error_type, "Exception");
        assert_eq!(report.message, "boom");
    }

    #[tokio::test]
    async fn non_reportable_failures_are_not_reported() {
        let f = fixture(Controller::new("C"), false);
        let resp = get(&f.router, "/refuse", false).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(resp.headers().get(X_ERROR_REPORT).is_none());
        assert!(f.reporter.reports().is_empty());
    }

    #[test]
    fn reporter_keeps_only_the_newest_reports() {
        let reporter = ErrorReporter::with_capacity(2);
        let failure = Failure {
            error_type: "Exception".to_string(),
            message: "boom".to_string(),
            reportable: true,
        };
        let refs: Vec<ErrorReportRef> = (0..3)
            .map(|i| {
                reporter.report(ErrorReportKind::ServerRequestFail, format!("request {i}"), &failure)
            })
            .collect();

        let kept: Vec<String> = reporter.reports().into_iter().map(|r| r.description).collect();
        assert_eq!(kept, ["request 1", "request 2"]);
        assert!(reporter.get(&refs[0].base).is_none());
        assert!(reporter.get(&refs[2].base).is_some());
    }
}
