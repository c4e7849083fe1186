//! Client side of the installer RPC layer.
//!
//! A [`Client`] walks an [`Api`](installrpc_api::Api) tree the way the server
//! binds it: `.at(name)` for named children, `.param(value)` for a path
//! parameter, then `.call(verb, Call)` to issue the request. Requests go
//! through a [`Transport`]; [`UnixTransport`] talks to the installer socket
//! and [`HttpTransport`] to a loopback TCP port.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`client`] | [`Client`], [`Call`] and argument binding |
//! | [`hooks`] | [`ResponseHook`] and the stock [`status_hook`] |
//! | [`transport`] | The [`Transport`] trait and request/response types |
//! | [`unix`] / [`tcp`] | The two transports |

pub mod client;
pub mod error;
pub mod hooks;
pub mod tcp;
pub mod transport;
pub mod unix;

pub use client::{Call, Client, ClientBuilder};
pub use error::ClientError;
pub use hooks::{status_hook, ResponseHook, StatusHook};
pub use tcp::HttpTransport;
pub use transport::{RpcRequest, RpcResponse, Transport, TransportError};
pub use unix::UnixTransport;
