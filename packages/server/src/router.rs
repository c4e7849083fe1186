//! Assembles the Axum [`Router`] from bound controllers.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::{
    bind::Binder,
    config::ServerConfig,
    error::StartupError,
    meta::{self, Application},
    middleware::status::{status_middleware, ErrorReporter, StatusContext},
};

/// Wrap everything bound so far in the status middleware and request tracing.
pub fn build_router(
    binder: Binder,
    updated: bool,
    app: &Application,
    reporter: Arc<ErrorReporter>,
) -> Router {
    let ctx = Arc::new(StatusContext {
        routes: binder.route_table(),
        updated,
        state: app.subscribe(),
        reporter,
    });
    binder
        .into_router()
        .layer(axum::middleware::from_fn(move |req, next| {
            status_middleware(Arc::clone(&ctx), req, next)
        }))
        .layer(TraceLayer::new_for_http())
}

/// The router served by the `installrpc-server` binary: the `meta` API.
pub fn meta_router(
    config: &ServerConfig,
    app: Arc<Application>,
    reporter: Arc<ErrorReporter>,
) -> Result<Router, StartupError> {
    let api = meta::api()?;
    let mut binder = Binder::new(config.serializer, app.gate());
    if let Some(node) = api.root().child("meta") {
        binder.bind(node, Arc::new(app.controller()))?;
    }
    Ok(build_router(binder, config.updated, &app, reporter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use installrpc_api::headers::{X_STATUS, X_UPDATED};
    use tower::ServiceExt;

    use crate::gate::StartGate;

    #[tokio::test]
    async fn meta_router_serves_status_with_fingerprint() {
        let config = ServerConfig {
            updated: true,
            ..ServerConfig::default()
        };
        let app = Arc::new(Application::new(Arc::new(StartGate::new()), None));
        let router = meta_router(&config, app, Arc::new(ErrorReporter::new())).unwrap();
        let resp = router
            .oneshot(
                axum::http::Request::get("/meta/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()[X_STATUS], "ok");
        assert_eq!(resp.headers()[X_UPDATED], "yes");
    }
}
