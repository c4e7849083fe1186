//! Server configuration, populated from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use installrpc::{EnumEncoding, Serializer};
use thiserror::Error;

/// Where the server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listen {
    /// A Unix domain socket at this path; a stale socket file is replaced.
    Unix(PathBuf),
    /// A loopback TCP address.
    Tcp(SocketAddr),
}

/// Runtime configuration for the RPC server.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `INSTALLRPC_SOCKET` | (absent) | Unix socket path; wins over `INSTALLRPC_BIND` |
/// | `INSTALLRPC_BIND` | `127.0.0.1:8235` | Loopback TCP address to listen on |
/// | `INSTALLRPC_COMPACT` | `false` | Positional record/union encoding |
/// | `INSTALLRPC_IGNORE_UNKNOWN_FIELDS` | `false` | Drop unknown record fields instead of failing |
/// | `INSTALLRPC_ENUMS_BY` | `name` | `name` or `value` |
/// | `INSTALLRPC_UPDATED` | `false` | Report `x-updated: yes` to clients |
///
/// Boolean variables accept `1`/`true`/`yes` and `0`/`false`/`no`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen: Listen,

    /// Serializer shared by every bound method.
    pub serializer: Serializer,

    /// Whether this server was updated since the client first connected.
    pub updated: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a socket address (e.g. 127.0.0.1:8235), got {value:?}")]
    InvalidAddress { var: &'static str, value: String },

    #[error("{var} must be a loopback address, got {addr}")]
    NotLoopback { var: &'static str, addr: SocketAddr },

    #[error("{var} must be a boolean, got {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var}: {message}")]
    Invalid { var: &'static str, message: String },
}

pub const DEFAULT_BIND: &str = "127.0.0.1:8235";

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen = match lookup("INSTALLRPC_SOCKET") {
            Some(path) if !path.is_empty() => Listen::Unix(PathBuf::from(path)),
            _ => {
                let value = lookup("INSTALLRPC_BIND").unwrap_or_else(|| DEFAULT_BIND.into());
                let addr: SocketAddr =
                    value.parse().map_err(|_| ConfigError::InvalidAddress {
                        var: "INSTALLRPC_BIND",
                        value: value.clone(),
                    })?;
                if !addr.ip().is_loopback() {
                    return Err(ConfigError::NotLoopback {
                        var: "INSTALLRPC_BIND",
                        addr,
                    });
                }
                Listen::Tcp(addr)
            }
        };

        let enums_by = match lookup("INSTALLRPC_ENUMS_BY") {
            Some(v) => v.parse::<EnumEncoding>().map_err(|e| ConfigError::Invalid {
                var: "INSTALLRPC_ENUMS_BY",
                message: e.to_string(),
            })?,
            None => EnumEncoding::default(),
        };

        let serializer = Serializer::new()
            .compact(flag(&lookup, "INSTALLRPC_COMPACT")?)
            .ignore_unknown_fields(flag(&lookup, "INSTALLRPC_IGNORE_UNKNOWN_FIELDS")?)
            .serialize_enums_by(enums_by);

        Ok(Self {
            listen,
            serializer,
            updated: flag(&lookup, "INSTALLRPC_UPDATED")?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: Listen::Tcp(SocketAddr::from(([127, 0, 0, 1], 8235))),
            serializer: Serializer::new(),
            updated: false,
        }
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" => Ok(false),
        "1" | "true" | "yes" => Ok(true),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}
