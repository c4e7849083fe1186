//! The seam between the client and the wire.

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use installrpc_api::Verb;
use serde_json::Value as Json;
use thiserror::Error;

/// One request as the client builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRequest {
    pub verb: Verb,
    /// Path plus encoded query string, e.g. `/meta/status?cur=%22RUNNING%22`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    /// JSON body, present only when a payload argument was supplied.
    pub body: Option<Vec<u8>>,
}

/// One response as the transport received it.
#[derive(Debug, Clone)]
pub struct RpcResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RpcResponse {
    /// A header as text; lookups are case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<Json, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot connect to {target}: {message}")]
    Connect { target: String, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Sends a request and returns the whole response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, req: RpcRequest) -> Result<RpcResponse, TransportError>;
}
