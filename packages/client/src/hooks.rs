//! Response hooks: inspect every response before the client decodes it.

use std::sync::Mutex;

use installrpc_api::headers::{STATUS_CONFIRM, STATUS_SKIP, X_ERROR_REPORT, X_STATUS, X_UPDATED};
use installrpc_api::ErrorReportRef;
use tracing::warn;

use crate::error::ClientError;
use crate::transport::RpcResponse;

/// Runs on every response; an error replaces the call's result.
pub trait ResponseHook: Send + Sync {
    fn on_response(&self, resp: &RpcResponse) -> Result<(), ClientError>;
}

impl<F> ResponseHook for F
where
    F: Fn(&RpcResponse) -> Result<(), ClientError> + Send + Sync,
{
    fn on_response(&self, resp: &RpcResponse) -> Result<(), ClientError> {
        self(resp)
    }
}

/// The stock hook for installer clients.
///
/// * `x-updated` is remembered from the first response; a different value
///   later means the server restarted into a new build.
/// * `x-status: skip|confirm` become [`ClientError::Skip`] and
///   [`ClientError::Confirm`].
/// * `x-error-report` becomes [`ClientError::Abort`].
#[derive(Debug, Default)]
pub struct StatusHook {
    updated: Mutex<Option<String>>,
}

pub fn status_hook() -> StatusHook {
    StatusHook::default()
}

impl ResponseHook for StatusHook {
    fn on_response(&self, resp: &RpcResponse) -> Result<(), ClientError> {
        if let Some(updated) = resp.header(X_UPDATED) {
            let mut seen = self.updated.lock().unwrap_or_else(|p| p.into_inner());
            match seen.as_deref() {
                None => *seen = Some(updated.to_string()),
                Some(prev) if prev != updated => return Err(ClientError::ServerUpdated),
                Some(_) => {}
            }
        }
        match resp.header(X_STATUS) {
            Some(STATUS_SKIP) => return Err(ClientError::Skip),
            Some(STATUS_CONFIRM) => return Err(ClientError::Confirm),
            _ => {}
        }
        if let Some(report) = resp.header(X_ERROR_REPORT) {
            match serde_json::from_str::<ErrorReportRef>(report) {
                Ok(reference) => return Err(ClientError::Abort(reference)),
                Err(e) => warn!(error = %e, "ignoring malformed x-error-report"),
            }
        }
        Ok(())
    }
}
