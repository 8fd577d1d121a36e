//! Radix tree for route matching.
//!
//! Paths are split into `/`-separated segments. Static segments match
//! exactly; `{name}` segments match any single segment and capture it.
//! Lookup is O(k) in the number of path segments, not the number of routes.
//!
//! - Static children are tried before parameter children at every level.
//! - Several parameter children may share a position when routes name the
//!   parameter differently (`/users/{id}/posts` vs `/users/{user_id}/tags`);
//!   search backtracks across them and drops captures from failed branches.

use crate::endpoint::CompiledHandler;
use crate::request::ParamVec;
use http::Method;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered route: its pattern and compiled handler.
#[derive(Clone)]
pub struct RouteEntry {
    pub method: Method,
    pub pattern: String,
    pub handler: CompiledHandler,
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct RadixNode {
    /// The path segment this node represents (without leading /)
    segment: Cow<'static, str>,
    /// Routes terminating here, per method
    routes: HashMap<Method, Arc<RouteEntry>>,
    /// Parameter name if this segment is `{name}`
    param_name: Option<Arc<str>>,
    children: Vec<RadixNode>,
    param_children: Vec<RadixNode>,
}

impl RadixNode {
    fn new(segment: Cow<'static, str>) -> Self {
        Self {
            segment,
            routes: HashMap::new(),
            param_name: None,
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    fn new_param(param_name: &str) -> Self {
        Self {
            segment: Cow::Borrowed(""),
            routes: HashMap::new(),
            param_name: Some(Arc::from(param_name)),
            children: Vec::new(),
            param_children: Vec::new(),
        }
    }

    /// Inserts `route`; returns the route it replaced, if any.
    fn insert(&mut self, segments: &[&str], route: Arc<RouteEntry>) -> Option<Arc<RouteEntry>> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.routes.insert(route.method.clone(), route);
        };

        if let Some(param_name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            if let Some(child) = self
                .param_children
                .iter_mut()
                .find(|c| c.param_name.as_deref() == Some(param_name))
            {
                return child.insert(remaining, route);
            }
            let mut child = RadixNode::new_param(param_name);
            let replaced = child.insert(remaining, route);
            self.param_children.push(child);
            return replaced;
        }

        if let Some(child) = self.children.iter_mut().find(|c| c.segment == *segment) {
            return child.insert(remaining, route);
        }
        let mut child = RadixNode::new(Cow::Owned((*segment).to_string()));
        let replaced = child.insert(remaining, route);
        self.children.push(child);
        replaced
    }

    fn search(
        &self,
        segments: &[&str],
        method: &Method,
        params: &mut ParamVec,
    ) -> Option<Arc<RouteEntry>> {
        let Some((segment, remaining)) = segments.split_first() else {
            return self.routes.get(method).cloned();
        };

        for child in &self.children {
            if child.segment == *segment {
                if let Some(route) = child.search(remaining, method, params) {
                    return Some(route);
                }
            }
        }

        for param_child in &self.param_children {
            if let Some(param_name) = &param_child.param_name {
                params.push((Arc::clone(param_name), (*segment).to_string()));
                if let Some(route) = param_child.search(remaining, method, params) {
                    return Some(route);
                }
                // Backtrack: drop the capture from the failed branch.
                params.pop();
            }
        }

        None
    }

    fn has_any_route(&self, segments: &[&str]) -> bool {
        let Some((segment, remaining)) = segments.split_first() else {
            return !self.routes.is_empty();
        };
        self.children
            .iter()
            .filter(|c| c.segment == *segment)
            .chain(self.param_children.iter())
            .any(|c| c.has_any_route(remaining))
    }
}

fn split(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Route table keyed by path pattern and method.
#[derive(Clone)]
pub struct RadixRouter {
    root: RadixNode,
    len: usize,
}

impl RadixRouter {
    pub fn new() -> Self {
        Self {
            root: RadixNode::new(Cow::Borrowed("")),
            len: 0,
        }
    }

    /// Adds a route; a later route for the same method and pattern replaces the earlier one.
    pub fn insert(&mut self, route: RouteEntry) -> Option<Arc<RouteEntry>> {
        let pattern = route.pattern.clone();
        let replaced = self.root.insert(&split(&pattern), Arc::new(route));
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Matches `method` and `path`, returning the route and captured parameters.
    pub fn route(&self, method: &Method, path: &str) -> Option<(Arc<RouteEntry>, ParamVec)> {
        let mut params = ParamVec::new();
        let route = self.root.search(&split(path), method, &mut params)?;
        Some((route, params))
    }

    /// True when some method is registered for `path`.
    pub fn matches_path(&self, path: &str) -> bool {
        self.root.has_any_route(&split(path))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for RadixRouter {
    fn default() -> Self {
        Self::new()
    }
}
