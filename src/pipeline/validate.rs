//! Validation stage. Three checks run in order against the matched
//! route's configuration:
//!
//! 1. **Path parameters**: declared rules must be satisfiable (the
//!    parameter was extracted) and `match_identity` rules must agree with
//!    the verified identity. An identity mismatch is an authorization
//!    failure, not a malformed request.
//! 2. **Query whitelist**: when the route declares an allow list, every
//!    query parameter must be on it. Routes without a list accept any
//!    query parameter.
//! 3. **Request schema**: for POST and PUT on routes that declare a
//!    schema, the captured body must parse as JSON and validate, with
//!    every violation reported in one response.

use http::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{Next, ServiceRequest, ServiceResponse, Stage};
use crate::context::RequestContext;
use crate::errors::{FieldError, ServiceError};
use crate::registry::RouteRegistry;

pub struct ValidateStage {
    registry: Arc<RouteRegistry>,
}

impl ValidateStage {
    pub fn new(registry: Arc<RouteRegistry>) -> Self {
        Self { registry }
    }

    fn check_path_params(
        &self,
        req: &ServiceRequest,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let Some(rules) = self
            .registry
            .path_param_rules(&req.method, &req.route_path)
        else {
            return Ok(());
        };

        for (name, rule) in &rules {
            let value = req
                .path_param(name)
                .ok_or_else(|| ServiceError::InvalidPathParam(name.clone()))?;
            if rule.match_identity {
                let matches = match ctx.identity_value(name) {
                    Some(Value::String(s)) => s == value,
                    Some(Value::Number(n)) => n.to_string() == value,
                    Some(other) => other.to_string() == value,
                    None => false,
                };
                if !matches {
                    return Err(ServiceError::Unauthorized(format!(
                        "path parameter '{name}' does not match caller identity"
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_query_params(&self, req: &ServiceRequest) -> Result<(), ServiceError> {
        let Some(allowed) = self
            .registry
            .allowed_query_params(&req.method, &req.route_path)
        else {
            return Ok(());
        };

        for (key, _) in &req.query_params {
            if !allowed.contains(key.as_ref()) {
                return Err(ServiceError::InvalidQueryParam(key.to_string()));
            }
        }
        Ok(())
    }

    fn check_body(&self, req: &ServiceRequest, ctx: &RequestContext) -> Result<(), ServiceError> {
        if req.method != Method::POST && req.method != Method::PUT {
            return Ok(());
        }
        let Some(validator) = self.registry.request_schema(&req.method, &req.route_path) else {
            return Ok(());
        };

        let body = ctx
            .raw_body
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ServiceError::InvalidJson("request body required".to_string()))?;
        let instance: Value = serde_json::from_slice(body)
            .map_err(|e| ServiceError::InvalidJson(e.to_string()))?;

        let errors: Vec<FieldError> = validator
            .iter_errors(&instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                let message = strip_field_prefix(&path, &e.to_string());
                FieldError::new(path, message)
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            debug!(violations = errors.len(), "Request body failed validation");
            Err(ServiceError::SchemaValidation(errors))
        }
    }
}

/// Violation messages often begin with the offending field, quoted or
/// bare. The field is already carried in `dataPath`, so drop the prefix
/// rather than say it twice.
fn strip_field_prefix(pointer: &str, message: &str) -> String {
    let Some(field) = pointer.rsplit('/').next().filter(|f| !f.is_empty()) else {
        return message.to_string();
    };
    let quoted = format!("\"{field}\" ");
    if let Some(rest) = message.strip_prefix(&quoted) {
        return rest.to_string();
    }
    let bare = format!("{field} ");
    if let Some(rest) = message.strip_prefix(&bare) {
        return rest.to_string();
    }
    message.to_string()
}

impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError> {
        self.check_path_params(req, ctx)?;
        self.check_query_params(req)?;
        self.check_body(req, ctx)?;
        next.run(req, ctx)
    }
}
