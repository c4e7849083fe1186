//! The single error kind raised by the [`Serializer`](crate::Serializer).

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// A shape mismatch, missing required field, disallowed unknown field, or
/// ambiguous union match.
///
/// `path` locates the failure inside the value being (de)serialized, using
/// `.field` for identifier-like names, `['field-1']` for anything else and
/// `[3]` for sequence positions. The empty path is the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at {}: {message}", location(.path))]
pub struct SerializationError {
    pub path: String,
    pub message: String,
}

impl SerializationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// `missing required argument "<name>"` at `path`.
    pub fn missing_argument(path: impl Into<String>, name: &str) -> Self {
        Self::new(path, format!("missing required argument \"{name}\""))
    }
}

fn location(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

// --- path helpers ------------------------------------------------------------

static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("invalid identifier regex"));

/// Extend `path` with a named member.
pub(crate) fn member_path(path: &str, name: &str) -> String {
    if IDENT_RE.is_match(name) {
        format!("{path}.{name}")
    } else {
        format!("{path}['{name}']")
    }
}

/// Extend `path` with a sequence position.
pub(crate) fn index_path(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}
