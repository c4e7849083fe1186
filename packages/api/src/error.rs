//! Definition-time errors. All of them are programmer errors and abort
//! startup.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiDefinitionError {
    /// Raw query mode only carries strings.
    #[error("{qualname} does not serialize query arguments but has non-str parameter '{param}'")]
    InvalidQueryArgs { qualname: String, param: String },

    #[error("{node} has multiple path parameters '{first}' and '{second}'")]
    MultiplePathParameters {
        node: String,
        first: String,
        second: String,
    },

    #[error("{qualname} has more than one payload parameter")]
    MultiplePayloads { qualname: String },

    #[error("{qualname} is declared more than once")]
    DuplicateMethod { qualname: String },

    #[error("{node} has more than one child named '{name}'")]
    DuplicateChild { node: String, name: String },

    #[error("parameter '{param}' of {qualname} shadows a path parameter")]
    PathParameterClash { qualname: String, param: String },

    #[error("{qualname} declares parameter '{param}' twice")]
    DuplicateParameter { qualname: String, param: String },
}
