//! # Route Configuration Registry
//!
//! Holds every registered route together with its middleware configuration,
//! pre-digested into per-concern lookup caches so pipeline stages never
//! rescan the full route list on the hot path.
//!
//! ## Caches
//!
//! Each concern gets its own `RwLock`-guarded map keyed by route pattern
//! and method: authentication schemes, required roles (all / any), required
//! identities (all / any), path-parameter rules, query whitelists, and
//! compiled request schemas. Absence is meaningful everywhere:
//!
//! - no authentication entry ⇒ the route is public
//! - no role or identity entry ⇒ that check passes vacuously
//! - no query whitelist ⇒ every query parameter is accepted
//! - no schema ⇒ the body is not validated
//!
//! Empty requirement lists are therefore never stored; `register` only
//! inserts entries that actually constrain something.
//!
//! Registration is fail-fast: an unknown authentication scheme, a duplicate
//! route, or a schema that does not compile aborts startup instead of
//! leaving a route half-configured.

use http::Method;
use jsonschema::Validator;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::auth::AuthKind;
use crate::errors::ServiceError;
use crate::pipeline::Handler;
use crate::schema_cache::{SchemaCache, SchemaRef};

/// Rule for a single path parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathParamRule {
    /// Require the path value to equal the caller's identity fact of the
    /// same name. A mismatch is an authorization failure.
    pub match_identity: bool,
}

/// Declarative middleware configuration for one route.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareConfig {
    /// Authentication scheme names. Empty means public.
    pub authentication: Vec<String>,
    /// Caller must hold every listed role.
    pub require_all_roles: Vec<String>,
    /// Caller must hold at least one listed role.
    pub require_any_role: Vec<String>,
    /// Caller's identity must contain every listed fact.
    pub require_all_identities: Vec<String>,
    /// Caller's identity must contain at least one listed fact.
    pub require_any_identity: Vec<String>,
    /// Per-path-parameter rules.
    pub path_params: HashMap<String, PathParamRule>,
    /// Accepted query parameter names. `None` accepts everything.
    pub allowed_query_params: Option<Vec<String>>,
    /// Request body schema for POST/PUT.
    pub request_schema: Option<SchemaRef>,
}

/// One registered route: method, path pattern, handler, and middleware.
pub struct RouteConfig {
    pub method: Method,
    /// Path pattern with `{name}` placeholders, e.g. `/pets/{id}`.
    pub path: String,
    pub handler: Arc<dyn Handler>,
    pub middleware: MiddlewareConfig,
}

impl std::fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteConfig")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middleware", &self.middleware)
            .finish()
    }
}

type RouteKey = (String, Method);

/// Registry of routes and their pre-digested middleware lookups.
pub struct RouteRegistry {
    schema_cache: Arc<SchemaCache>,
    routes: RwLock<HashMap<RouteKey, Arc<RouteConfig>>>,
    authn: RwLock<HashMap<RouteKey, Vec<AuthKind>>>,
    all_roles: RwLock<HashMap<RouteKey, Vec<String>>>,
    any_role: RwLock<HashMap<RouteKey, Vec<String>>>,
    all_identities: RwLock<HashMap<RouteKey, Vec<String>>>,
    any_identity: RwLock<HashMap<RouteKey, Vec<String>>>,
    path_rules: RwLock<HashMap<RouteKey, HashMap<String, PathParamRule>>>,
    query_allow: RwLock<HashMap<RouteKey, HashSet<String>>>,
    schemas: RwLock<HashMap<RouteKey, Arc<Validator>>>,
}

impl RouteRegistry {
    pub fn new(schema_cache: Arc<SchemaCache>) -> Self {
        Self {
            schema_cache,
            routes: RwLock::new(HashMap::new()),
            authn: RwLock::new(HashMap::new()),
            all_roles: RwLock::new(HashMap::new()),
            any_role: RwLock::new(HashMap::new()),
            all_identities: RwLock::new(HashMap::new()),
            any_identity: RwLock::new(HashMap::new()),
            path_rules: RwLock::new(HashMap::new()),
            query_allow: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Register a route and populate every concern cache for it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] for a duplicate method/path pair,
    /// an unknown authentication scheme, or a schema that fails to compile.
    pub fn register(&self, route: RouteConfig) -> Result<(), ServiceError> {
        let key: RouteKey = (route.path.clone(), route.method.clone());

        // Parse and compile everything before touching any cache so a
        // failed registration leaves no partial entries behind.
        let kinds: Vec<AuthKind> = route
            .middleware
            .authentication
            .iter()
            .map(|s| s.parse())
            .collect::<Result<_, _>>()?;

        let validator = match &route.middleware.request_schema {
            Some(schema) => Some(self.schema_cache.get(schema)?),
            None => None,
        };

        {
            let mut routes = self.routes.write().map_err(|_| lock_poisoned())?;
            if routes.contains_key(&key) {
                return Err(ServiceError::Config(format!(
                    "duplicate route {} {}",
                    route.method, route.path
                )));
            }
            info!(method = %route.method, path = %route.path, "Route registered");
            routes.insert(key.clone(), Arc::new(route));
        }
        let route = self.get(&key.1, &key.0).ok_or_else(|| {
            ServiceError::Internal("route vanished during registration".to_string())
        })?;
        let mw = &route.middleware;

        if !kinds.is_empty() {
            self.authn
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), kinds);
        }
        if !mw.require_all_roles.is_empty() {
            self.all_roles
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), mw.require_all_roles.clone());
        }
        if !mw.require_any_role.is_empty() {
            self.any_role
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), mw.require_any_role.clone());
        }
        if !mw.require_all_identities.is_empty() {
            self.all_identities
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), mw.require_all_identities.clone());
        }
        if !mw.require_any_identity.is_empty() {
            self.any_identity
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), mw.require_any_identity.clone());
        }
        if !mw.path_params.is_empty() {
            self.path_rules
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), mw.path_params.clone());
        }
        if let Some(allowed) = &mw.allowed_query_params {
            self.query_allow
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key.clone(), allowed.iter().cloned().collect());
        }
        if let Some(validator) = validator {
            self.schemas
                .write()
                .map_err(|_| lock_poisoned())?
                .insert(key, validator);
        }

        Ok(())
    }

    /// All registered routes, for router construction.
    pub fn routes(&self) -> Vec<Arc<RouteConfig>> {
        self.routes
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up one route by method and pattern.
    pub fn get(&self, method: &Method, path: &str) -> Option<Arc<RouteConfig>> {
        self.routes
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    /// Authentication schemes for a route. `None` means public.
    pub fn authn_kinds(&self, method: &Method, path: &str) -> Option<Vec<AuthKind>> {
        self.authn
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    pub fn required_all_roles(&self, method: &Method, path: &str) -> Option<Vec<String>> {
        self.all_roles
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    pub fn required_any_role(&self, method: &Method, path: &str) -> Option<Vec<String>> {
        self.any_role
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    pub fn required_all_identities(&self, method: &Method, path: &str) -> Option<Vec<String>> {
        self.all_identities
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    pub fn required_any_identity(&self, method: &Method, path: &str) -> Option<Vec<String>> {
        self.any_identity
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    pub fn path_param_rules(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<HashMap<String, PathParamRule>> {
        self.path_rules
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    /// Accepted query parameter names. `None` accepts everything.
    pub fn allowed_query_params(&self, method: &Method, path: &str) -> Option<HashSet<String>> {
        self.query_allow
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }

    /// Compiled request-body validator, if the route declares a schema.
    pub fn request_schema(&self, method: &Method, path: &str) -> Option<Arc<Validator>> {
        self.schemas
            .read()
            .ok()?
            .get(&(path.to_string(), method.clone()))
            .cloned()
    }
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.routes.read().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("RouteRegistry")
            .field("routes", &count)
            .finish()
    }
}

fn lock_poisoned() -> ServiceError {
    ServiceError::Internal("registry lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HandlerPayload, ServiceRequest};
    use crate::context::RequestContext;
    use serde_json::json;

    fn noop_handler() -> Arc<dyn Handler> {
        Arc::new(
            |_req: &ServiceRequest,
             _ctx: &mut RequestContext|
             -> Result<HandlerPayload, crate::errors::ServiceError> {
                Ok(HandlerPayload::ok(json!({})))
            },
        )
    }

    fn route(method: Method, path: &str, mw: MiddlewareConfig) -> RouteConfig {
        RouteConfig {
            method,
            path: path.to_string(),
            handler: noop_handler(),
            middleware: mw,
        }
    }

    fn registry() -> RouteRegistry {
        RouteRegistry::new(Arc::new(SchemaCache::default()))
    }

    #[test]
    fn test_register_and_lookup() {
        let reg = registry();
        reg.register(route(
            Method::GET,
            "/pets/{id}",
            MiddlewareConfig {
                authentication: vec!["bearer".to_string()],
                require_any_role: vec!["reader".to_string()],
                ..Default::default()
            },
        ))
        .unwrap();

        assert!(reg.get(&Method::GET, "/pets/{id}").is_some());
        assert_eq!(
            reg.authn_kinds(&Method::GET, "/pets/{id}"),
            Some(vec![AuthKind::Bearer])
        );
        assert_eq!(
            reg.required_any_role(&Method::GET, "/pets/{id}"),
            Some(vec!["reader".to_string()])
        );
        // Unconfigured concerns are absent, not empty.
        assert_eq!(reg.required_all_roles(&Method::GET, "/pets/{id}"), None);
        assert_eq!(reg.allowed_query_params(&Method::GET, "/pets/{id}"), None);
    }

    #[test]
    fn test_public_route_has_no_authn_entry() {
        let reg = registry();
        reg.register(route(Method::GET, "/health", MiddlewareConfig::default()))
            .unwrap();
        assert_eq!(reg.authn_kinds(&Method::GET, "/health"), None);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let reg = registry();
        reg.register(route(Method::GET, "/pets", MiddlewareConfig::default()))
            .unwrap();
        let err = reg
            .register(route(Method::GET, "/pets", MiddlewareConfig::default()))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }

    #[test]
    fn test_same_path_different_methods_isolated() {
        let reg = registry();
        reg.register(route(
            Method::GET,
            "/pets",
            MiddlewareConfig::default(),
        ))
        .unwrap();
        reg.register(route(
            Method::POST,
            "/pets",
            MiddlewareConfig {
                require_all_roles: vec!["writer".to_string()],
                ..Default::default()
            },
        ))
        .unwrap();

        assert_eq!(reg.required_all_roles(&Method::GET, "/pets"), None);
        assert_eq!(
            reg.required_all_roles(&Method::POST, "/pets"),
            Some(vec!["writer".to_string()])
        );
    }

    #[test]
    fn test_unknown_auth_scheme_rejected_without_partial_state() {
        let reg = registry();
        let err = reg
            .register(route(
                Method::GET,
                "/pets",
                MiddlewareConfig {
                    authentication: vec!["digest".to_string()],
                    ..Default::default()
                },
            ))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
        assert!(reg.get(&Method::GET, "/pets").is_none());
    }

    #[test]
    fn test_query_whitelist_stored() {
        let reg = registry();
        reg.register(route(
            Method::GET,
            "/pets",
            MiddlewareConfig {
                allowed_query_params: Some(vec!["status".to_string(), "limit".to_string()]),
                ..Default::default()
            },
        ))
        .unwrap();
        let allowed = reg.allowed_query_params(&Method::GET, "/pets").unwrap();
        assert!(allowed.contains("status"));
        assert!(!allowed.contains("owner"));
    }
}
