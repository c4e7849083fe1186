//! The validated, immutable API tree.

use std::collections::HashSet;
use std::sync::Arc;

use installrpc::Annotation;

use crate::defs::{Endpoint, MethodDef, Verb};
use crate::error::ApiDefinitionError;

/// A node of a defined API. Built only by [`Api::define`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiNode {
    name: String,
    qualname: String,
    path: String,
    prefix: String,
    path_params: Vec<String>,
    path_parameter: bool,
    serialize_query_args: bool,
    methods: Vec<MethodDef>,
    children: Vec<ApiNode>,
}

impl ApiNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted name from the root, e.g. `API.endpoint.nested`.
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// URL path template, e.g. `/{param1}/{param2}`; `/` for the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Ancestor names below the root joined by `_`; empty for the root.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Path parameters captured on the way down to (and including) this node.
    pub fn path_params(&self) -> &[String] {
        &self.path_params
    }

    pub fn is_path_parameter(&self) -> bool {
        self.path_parameter
    }

    pub fn serialize_query_args(&self) -> bool {
        self.serialize_query_args
    }

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub fn method(&self, verb: Verb) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.verb == verb)
    }

    pub fn children(&self) -> &[ApiNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&ApiNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// The wildcard child, if any.
    pub fn path_parameter_child(&self) -> Option<&ApiNode> {
        self.children.iter().find(|c| c.path_parameter)
    }

    /// Registration key for a verb on this node: `GET` at the root,
    /// `<prefix>_GET` below it.
    pub fn handler_key(&self, verb: Verb) -> String {
        if self.prefix.is_empty() {
            verb.to_string()
        } else {
            format!("{}_{verb}", self.prefix)
        }
    }

    /// Like [`handler_key`](Self::handler_key), but relative to `base`, the
    /// node a controller is bound at: binding `API.endpoint` looks up
    /// `nested_GET` for `API.endpoint.nested`.
    pub fn handler_key_relative_to(&self, base: &ApiNode, verb: Verb) -> String {
        let rel = if base.prefix.is_empty() {
            self.prefix.as_str()
        } else {
            self.prefix
                .strip_prefix(base.prefix.as_str())
                .map_or(self.prefix.as_str(), |rest| rest.trim_start_matches('_'))
        };
        if rel.is_empty() {
            verb.to_string()
        } else {
            format!("{rel}_{verb}")
        }
    }

    /// `API.endpoint.GET`.
    pub fn method_qualname(&self, verb: Verb) -> String {
        format!("{}.{verb}", self.qualname)
    }

    /// Every `(node, method)` pair in this subtree, depth first.
    pub fn walk(&self) -> Vec<(&ApiNode, &MethodDef)> {
        let mut out = Vec::new();
        self.walk_into(&mut out);
        out
    }

    fn walk_into<'a>(&'a self, out: &mut Vec<(&'a ApiNode, &'a MethodDef)>) {
        for m in &self.methods {
            out.push((self, m));
        }
        for c in &self.children {
            c.walk_into(out);
        }
    }

    /// Match a concrete request path against this node's template, returning
    /// the captured path parameter values in declaration order.
    pub fn match_path(&self, path: &str) -> Option<Vec<String>> {
        match_template(&self.path, path)
    }

    fn nodes_into<'a>(&'a self, out: &mut Vec<&'a ApiNode>) {
        out.push(self);
        for c in &self.children {
            c.nodes_into(out);
        }
    }
}

/// Match `path` against a template such as `/{param}/more`, returning the
/// raw (still percent-encoded) values of the `{...}` segments.
pub fn match_template(template: &str, path: &str) -> Option<Vec<String>> {
    let mut actual = path.split('/').filter(|s| !s.is_empty());
    let mut captured = Vec::new();
    for seg in template.split('/').filter(|s| !s.is_empty()) {
        let got = actual.next()?;
        if seg.starts_with('{') && seg.ends_with('}') {
            captured.push(got.to_string());
        } else if seg != got {
            return None;
        }
    }
    actual.next().is_none().then_some(captured)
}

/// Literal (non-wildcard) segments in a template; more is more specific.
pub fn literal_segments(template: &str) -> usize {
    template
        .split('/')
        .filter(|s| !s.is_empty() && !s.starts_with('{'))
        .count()
}

/// A defined API: a validated tree behind an [`Arc`], cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Api {
    root: Arc<ApiNode>,
}

/// What a node inherits from its parent.
struct Scope<'a> {
    qualname: &'a str,
    path: &'a str,
    prefix: &'a str,
    path_params: &'a [String],
    serialize_query_args: bool,
}

impl Api {
    /// Freeze a declared tree, assigning paths and qualified names and
    /// rejecting malformed declarations.
    pub fn define(root: Endpoint) -> Result<Self, ApiDefinitionError> {
        let node = build(root, None)?;
        Ok(Self {
            root: Arc::new(node),
        })
    }

    pub fn root(&self) -> &ApiNode {
        &self.root
    }

    /// The node whose path template is exactly `template`.
    pub fn find(&self, template: &str) -> Option<&ApiNode> {
        self.nodes().into_iter().find(|n| n.path == template)
    }

    /// Every node, depth first, root included.
    pub fn nodes(&self) -> Vec<&ApiNode> {
        let mut out = Vec::new();
        self.root.nodes_into(&mut out);
        out
    }
}

fn build(ep: Endpoint, parent: Option<&Scope<'_>>) -> Result<ApiNode, ApiDefinitionError> {
    let segment = if ep.path_parameter {
        format!("{{{}}}", ep.name)
    } else {
        ep.name.clone()
    };

    let (qualname, path, prefix, mut path_params, inherited) = match parent {
        None => (ep.name.clone(), "/".to_string(), String::new(), Vec::new(), true),
        Some(p) => (
            format!("{}.{}", p.qualname, ep.name),
            if p.path == "/" {
                format!("/{segment}")
            } else {
                format!("{}/{segment}", p.path)
            },
            if p.prefix.is_empty() {
                ep.name.clone()
            } else {
                format!("{}_{}", p.prefix, ep.name)
            },
            p.path_params.to_vec(),
            p.serialize_query_args,
        ),
    };
    if ep.path_parameter && parent.is_some() {
        path_params.push(ep.name.clone());
    }
    let serialize_query_args = ep.serialize_query_args.unwrap_or(inherited);

    let mut wildcards = ep.children.iter().filter(|c| c.path_parameter);
    if let (Some(first), Some(second)) = (wildcards.next(), wildcards.next()) {
        return Err(ApiDefinitionError::MultiplePathParameters {
            node: qualname,
            first: first.name.clone(),
            second: second.name.clone(),
        });
    }
    let mut seen = HashSet::new();
    for c in &ep.children {
        if !seen.insert(c.name.as_str()) {
            return Err(ApiDefinitionError::DuplicateChild {
                node: qualname,
                name: c.name.clone(),
            });
        }
    }

    let mut verbs = HashSet::new();
    for m in &ep.methods {
        let method_qualname = format!("{qualname}.{}", m.verb);
        if !verbs.insert(m.verb) {
            return Err(ApiDefinitionError::DuplicateMethod {
                qualname: method_qualname,
            });
        }
        check_method(m, &method_qualname, &path_params, serialize_query_args)?;
    }

    let scope = Scope {
        qualname: &qualname,
        path: &path,
        prefix: &prefix,
        path_params: &path_params,
        serialize_query_args,
    };
    let children = ep
        .children
        .into_iter()
        .map(|c| build(c, Some(&scope)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApiNode {
        name: ep.name,
        qualname,
        path,
        prefix,
        path_params,
        path_parameter: ep.path_parameter,
        serialize_query_args,
        methods: ep.methods,
        children,
    })
}

fn check_method(
    m: &MethodDef,
    qualname: &str,
    path_params: &[String],
    serialize_query_args: bool,
) -> Result<(), ApiDefinitionError> {
    let mut names = HashSet::new();
    for p in &m.params {
        if !names.insert(p.name.as_str()) {
            return Err(ApiDefinitionError::DuplicateParameter {
                qualname: qualname.to_string(),
                param: p.name.clone(),
            });
        }
        if path_params.contains(&p.name) {
            return Err(ApiDefinitionError::PathParameterClash {
                qualname: qualname.to_string(),
                param: p.name.clone(),
            });
        }
    }
    if m.params.iter().filter(|p| p.payload).count() > 1 {
        return Err(ApiDefinitionError::MultiplePayloads {
            qualname: qualname.to_string(),
        });
    }
    if !serialize_query_args {
        if let Some(p) = m.query_params().find(|p| p.annotation != Annotation::Str) {
            return Err(ApiDefinitionError::InvalidQueryArgs {
                qualname: qualname.to_string(),
                param: p.name.clone(),
            });
        }
    }
    Ok(())
}
