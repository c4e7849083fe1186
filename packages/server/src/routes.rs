//! Which controller handles a request, for middleware that needs to
//! attribute a request before (or without) dispatching it.

use std::sync::Arc;

use axum::http::Method;
use installrpc_api::{literal_segments, match_template, Verb};

use crate::controller::Controller;

#[derive(Debug, Clone)]
pub(crate) struct RouteEntry {
    pub(crate) verb: Verb,
    pub(crate) template: String,
    pub(crate) controller: Arc<Controller>,
}

/// Snapshot of every bound `(verb, path template)` and its controller.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Arc<Vec<RouteEntry>>,
}

impl RouteTable {
    pub(crate) fn new(entries: Vec<RouteEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// The controller bound to `method` at `path`. Literal segments win over
    /// path parameters, matching the router.
    pub fn controller_for(&self, method: &Method, path: &str) -> Option<Arc<Controller>> {
        let verb: Verb = method.as_str().parse().ok()?;
        self.entries
            .iter()
            .filter(|e| e.verb == verb && match_template(&e.template, path).is_some())
            .max_by_key(|e| literal_segments(&e.template))
            .map(|e| Arc::clone(&e.controller))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
