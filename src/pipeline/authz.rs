//! Authorization stage. Checks the verified claims against the route's
//! role and identity requirements. Requirements a route does not declare
//! pass vacuously; the first failed check short-circuits with 403.

use std::sync::Arc;

use super::{Next, ServiceRequest, ServiceResponse, Stage};
use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::registry::RouteRegistry;

pub struct AuthzStage {
    registry: Arc<RouteRegistry>,
}

impl AuthzStage {
    pub fn new(registry: Arc<RouteRegistry>) -> Self {
        Self { registry }
    }
}

impl Stage for AuthzStage {
    fn name(&self) -> &'static str {
        "authz"
    }

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError> {
        let method = &req.method;
        let path = req.route_path.as_ref();

        if let Some(required) = self.registry.required_all_identities(method, path) {
            for key in &required {
                if ctx.identity_value(key).is_none() {
                    return Err(ServiceError::Unauthorized(format!(
                        "missing required identity '{key}'"
                    )));
                }
            }
        }

        if let Some(required) = self.registry.required_any_identity(method, path) {
            if !required.iter().any(|key| ctx.identity_value(key).is_some()) {
                return Err(ServiceError::Unauthorized(
                    "none of the accepted identities present".to_string(),
                ));
            }
        }

        if let Some(required) = self.registry.required_all_roles(method, path) {
            for role in &required {
                if !ctx.has_role(role) {
                    return Err(ServiceError::Unauthorized(format!(
                        "missing required role '{role}'"
                    )));
                }
            }
        }

        if let Some(required) = self.registry.required_any_role(method, path) {
            if !required.iter().any(|role| ctx.has_role(role)) {
                return Err(ServiceError::Unauthorized(
                    "none of the accepted roles present".to_string(),
                ));
            }
        }

        next.run(req, ctx)
    }
}
