//! HTTP over loopback TCP, via `reqwest`.

use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::{Method, Url};

use crate::transport::{RpcRequest, RpcResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `base_url` must point at a loopback host, e.g. `http://127.0.0.1:8235`.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidRequest(format!("{base_url}: {e}")))?;
        if !is_loopback(&url) {
            return Err(TransportError::InvalidRequest(format!(
                "{base_url} is not a loopback address"
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn is_loopback(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, req: RpcRequest) -> Result<RpcResponse, TransportError> {
        let method = Method::from_bytes(req.verb.as_str().as_bytes())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base, req.path));
        for (name, value) in &req.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = req.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let resp = builder.send().await.map_err(|e| {
            if e.is_connect() {
                TransportError::Connect {
                    target: self.base.clone(),
                    message: e.to_string(),
                }
            } else {
                TransportError::Http(e.to_string())
            }
        })?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(RpcResponse {
            status,
            headers,
            body,
        })
    }
}
