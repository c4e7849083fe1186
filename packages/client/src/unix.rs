//! HTTP/1 over a Unix domain socket, one connection per request.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::debug;

use crate::transport::{RpcRequest, RpcResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct UnixTransport {
    path: PathBuf,
}

impl UnixTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Transport for UnixTransport {
    async fn request(&self, req: RpcRequest) -> Result<RpcResponse, TransportError> {
        let stream = UnixStream::connect(&self.path)
            .await
            .map_err(|e| TransportError::Connect {
                target: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "unix socket connection closed with error");
            }
        });

        // The host is never looked at, but HTTP/1.1 requires one.
        let mut builder = http::Request::builder()
            .method(req.verb.as_str())
            .uri(&req.path)
            .header(HOST, "localhost");
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if req.body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(req.body.unwrap_or_default())))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let resp = sender
            .send_request(request)
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let (parts, body) = resp.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?
            .to_bytes();
        Ok(RpcResponse {
            status: parts.status.as_u16(),
            headers: parts.headers,
            body,
        })
    }
}
