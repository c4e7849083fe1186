//! Error types for binding and for request handling.
//!
//! [`AppError`] is what a handler returns; it converts directly into an HTTP
//! response carrying the `x-status` / `x-error-*` headers and a [`Failure`]
//! marker that middleware can inspect and recode.

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use installrpc::SerializationError;
use installrpc_api::headers::{STATUS_ERROR, X_ERROR_MSG, X_ERROR_TYPE, X_STATUS};
use installrpc_api::ApiDefinitionError;
use thiserror::Error;

use crate::config::ConfigError;

/// A failed request, as seen by the handler and by the client.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AppError {
    /// A required query, path or payload argument was not supplied.
    #[error("missing required argument \"{0}\"")]
    MissingArgument(String),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Any failure raised by controller code. `kind` becomes `x-error-type`.
    #[error("{message}")]
    Controller { kind: String, message: String },

    /// A non-fatal failure with a stable code. Non-reportable ones are the
    /// user's doing and answer 422 instead of 500.
    #[error("{title}: {message}")]
    Recoverable {
        code: String,
        title: String,
        message: String,
        reportable: bool,
    },
}

impl AppError {
    pub fn controller(kind: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Controller {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn recoverable(
        code: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        AppError::Recoverable {
            code: code.into(),
            title: title.into(),
            message: message.into(),
            reportable: true,
        }
    }

    /// Mark a recoverable error as not worth a crash report.
    pub fn non_reportable(self) -> Self {
        match self {
            AppError::Recoverable {
                code,
                title,
                message,
                ..
            } => AppError::Recoverable {
                code,
                title,
                message,
                reportable: false,
            },
            other => other,
        }
    }

    /// The `x-error-type` value.
    pub fn error_type(&self) -> &str {
        match self {
            AppError::MissingArgument(_) => "TypeError",
            AppError::Serialization(_) => "SerializationError",
            AppError::Controller { kind, .. } => kind,
            AppError::Recoverable { code, .. } => code,
        }
    }

    pub fn reportable(&self) -> bool {
        match self {
            AppError::Recoverable { reportable, .. } => *reportable,
            _ => true,
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.reportable() {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }

    /// The message sent in `x-error-msg`.
    pub fn message(&self) -> String {
        match self {
            AppError::Recoverable { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Left in the response extensions of every failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub error_type: String,
    pub message: String,
    pub reportable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let failure = Failure {
            error_type: self.error_type().to_string(),
            message: self.message(),
            reportable: self.reportable(),
        };
        let mut headers = HeaderMap::new();
        headers.insert(X_STATUS, HeaderValue::from_static(STATUS_ERROR));
        insert_lossy(&mut headers, X_ERROR_TYPE, &failure.error_type);
        insert_lossy(&mut headers, X_ERROR_MSG, &failure.message);

        let mut resp = (self.status(), headers, failure.message.clone()).into_response();
        resp.extensions_mut().insert(failure);
        resp
    }
}

/// Header values cannot carry control characters; replace them rather than
/// dropping the header.
pub(crate) fn insert_lossy(headers: &mut HeaderMap, name: &'static str, value: &str) {
    let value = HeaderValue::from_str(value).unwrap_or_else(|_| {
        let cleaned: String = value
            .chars()
            .map(|c| if c.is_control() || !c.is_ascii() { '?' } else { c })
            .collect();
        HeaderValue::from_str(&cleaned).unwrap_or(HeaderValue::from_static("?"))
    });
    headers.insert(HeaderName::from_static(name), value);
}

/// Problems found while binding controllers to an API tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// `methname` is the handler key that was looked up, e.g. `nested_GET`.
    #[error("no handler registered for {methname}")]
    MissingImplementation { methname: String },

    /// `methname` is the qualified method name, e.g. `API.GET`.
    #[error("handler for {methname} takes ({found}) but the API declares ({expected})")]
    SignatureMismatch {
        methname: String,
        expected: String,
        found: String,
    },

    #[error("{verb} {path} is bound more than once")]
    DuplicateRoute { verb: String, path: String },
}

/// Anything that stops the server binary from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiDefinitionError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
