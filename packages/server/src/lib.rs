//! Server side of the installer RPC layer.
//!
//! Controllers register handlers by key, a [`Binder`] checks them against an
//! API tree and produces an Axum router, and [`build_router`] wraps it in the
//! status middleware. The conformance suite uses this crate to serve APIs
//! in-process.

pub mod bind;
pub mod config;
pub mod controller;
pub mod error;
pub mod gate;
pub mod meta;
pub mod middleware;
pub mod router;
pub mod routes;

pub use bind::Binder;
pub use config::{Listen, ServerConfig};
pub use controller::{Args, Controller, Handler};
pub use error::{AppError, BindError, Failure, StartupError};
pub use gate::{StartGate, StartSignal};
pub use meta::{Application, ApplicationState};
pub use middleware::status::{status_middleware, ErrorReport, ErrorReporter, StatusContext};
pub use router::{build_router, meta_router};
pub use routes::RouteTable;
