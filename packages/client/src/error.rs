use installrpc::SerializationError;
use installrpc_api::ErrorReportRef;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A non-2xx response. `error_type` and `message` come from
    /// `x-error-type` / `x-error-msg` when the server set them.
    #[error("server returned {status}: {message}")]
    Server {
        status: u16,
        error_type: Option<String>,
        message: String,
    },

    /// The server says the view behind this request should be skipped.
    #[error("view skipped by server")]
    Skip,

    /// The server wants confirmation before showing this view.
    #[error("server requires confirmation")]
    Confirm,

    /// The server's `x-updated` fingerprint changed between calls.
    #[error("server was updated; restart the client")]
    ServerUpdated,

    /// The server filed an error report for this request.
    #[error("request aborted; error report {}", .0.base)]
    Abort(ErrorReportRef),

    #[error("{node} has no child endpoint {name:?}")]
    UnknownEndpoint { node: String, name: String },

    #[error("{node} does not support {verb}")]
    NoMethod { node: String, verb: String },

    #[error("{method} takes at most {max} positional arguments but {given} were given")]
    TooManyArguments {
        method: String,
        max: usize,
        given: usize,
    },

    #[error("{method} got an unexpected argument {name:?}")]
    UnknownArgument { method: String, name: String },

    #[error("{method} got multiple values for argument {name:?}")]
    DuplicateArgument { method: String, name: String },

    #[error("{method}: missing required argument \"{name}\"")]
    MissingArgument { method: String, name: String },
}
