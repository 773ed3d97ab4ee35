//! # Router
//!
//! Matches an incoming method and path against the registered route
//! patterns and extracts path parameters. Patterns use `{name}`
//! placeholders (`/pets/{id}`), each compiled once into an anchored regex
//! with a named capture group per placeholder.
//!
//! Parameter storage is a `SmallVec` sized for typical routes so matching
//! a request allocates nothing for up to [`MAX_INLINE_PARAMS`] parameters.

use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

use crate::errors::ServiceError;
use crate::registry::RouteConfig;

/// Inline capacity for extracted path parameters.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Key/value pairs extracted from a matched path, inline up to
/// [`MAX_INLINE_PARAMS`] entries.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A successful route match.
#[derive(Debug)]
pub struct RouteMatch {
    pub route: Arc<RouteConfig>,
    pub path_params: ParamVec,
}

struct CompiledRoute {
    regex: Regex,
    param_names: Vec<Arc<str>>,
    route: Arc<RouteConfig>,
}

/// Compiled route table. Built once at startup, shared read-only.
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    /// Compile every route's pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if a pattern produces an invalid
    /// regex.
    pub fn new(routes: Vec<Arc<RouteConfig>>) -> Result<Self, ServiceError> {
        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes {
            let (regex, param_names) = path_to_regex(&route.path)?;
            compiled.push(CompiledRoute {
                regex,
                param_names,
                route,
            });
        }
        Ok(Self { routes: compiled })
    }

    /// Match a request path, returning the route and its extracted path
    /// parameters. First registered match wins.
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        for entry in &self.routes {
            if entry.route.method != *method {
                continue;
            }
            if let Some(caps) = entry.regex.captures(path) {
                let mut path_params = ParamVec::new();
                for name in &entry.param_names {
                    if let Some(value) = caps.name(name.as_ref()) {
                        path_params.push((Arc::clone(name), value.as_str().to_string()));
                    }
                }
                debug!(method = %method, path, pattern = %entry.route.path, "Route matched");
                return Some(RouteMatch {
                    route: Arc::clone(&entry.route),
                    path_params,
                });
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.len()).finish()
    }
}

/// Convert `/pets/{id}` into an anchored regex with a named capture group
/// per placeholder, returning the group names in pattern order.
fn path_to_regex(path: &str) -> Result<(Regex, Vec<Arc<str>>), ServiceError> {
    let mut pattern = String::from("^");
    let mut param_names = Vec::new();

    for segment in path.trim_matches('/').split('/') {
        if segment.is_empty() {
            continue;
        }
        pattern.push('/');
        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            pattern.push_str(&format!("(?P<{name}>[^/]+)"));
            param_names.push(Arc::<str>::from(name));
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    if param_names.is_empty() && path == "/" {
        pattern.push('/');
    }
    pattern.push('$');

    let regex = Regex::new(&pattern).map_err(|e| {
        ServiceError::Config(format!("invalid route pattern '{path}': {e}"))
    })?;
    Ok((regex, param_names))
}
