//! `installrpc-server`: serves the installer `meta` API.
//!
//! # Quick start
//!
//! ```sh
//! # Loopback TCP on the default port:
//! installrpc-server
//!
//! # Unix socket, compact encoding:
//! INSTALLRPC_SOCKET=/run/installrpc.sock INSTALLRPC_COMPACT=1 installrpc-server
//! ```
//!
//! # Environment variables
//!
//! See [`installrpc_server::ServerConfig`] for the full list.

use std::sync::Arc;

use installrpc_server::{
    router::meta_router, Application, ErrorReporter, Listen, ServerConfig, StartGate,
    StartupError,
};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "installrpc_server=info,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let app = Arc::new(Application::new(Arc::new(StartGate::new()), Some(true)));
    let router = meta_router(&config, Arc::clone(&app), Arc::new(ErrorReporter::new()))?;
    // Nothing to start beyond the meta controller itself.
    app.controllers_started(false);

    match &config.listen {
        Listen::Tcp(addr) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::info!("listening on {addr}");
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Listen::Unix(path) => {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!("removed stale socket {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            let listener = tokio::net::UnixListener::bind(path)?;
            tracing::info!("listening on {}", path.display());
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            let _ = std::fs::remove_file(path);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
