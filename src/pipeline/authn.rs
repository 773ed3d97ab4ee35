//! Authentication stage. Routes with no configured scheme are public and
//! pass straight through with empty claims. For bearer routes the stage
//! pulls the token from the `Authorization` header, verifies it with the
//! claims codec, and copies the verified roles and identity into the
//! request context for the authorization stage.

use std::sync::Arc;
use tracing::debug;

use super::{Next, ServiceRequest, ServiceResponse, Stage};
use crate::auth::{AuthCodec, AuthKind};
use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::registry::RouteRegistry;

pub struct AuthnStage {
    registry: Arc<RouteRegistry>,
    codec: Arc<AuthCodec>,
}

impl AuthnStage {
    pub fn new(registry: Arc<RouteRegistry>, codec: Arc<AuthCodec>) -> Self {
        Self { registry, codec }
    }

    fn bearer_token<'a>(req: &'a ServiceRequest) -> Result<&'a str, ServiceError> {
        let raw = req
            .header("authorization")
            .ok_or_else(|| ServiceError::Unauthenticated("missing authorization header".to_string()))?;
        // Accept both "Bearer <token>" and a bare token.
        Ok(raw.strip_prefix("Bearer ").unwrap_or(raw).trim())
    }
}

impl Stage for AuthnStage {
    fn name(&self) -> &'static str {
        "authn"
    }

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError> {
        let kinds = self.registry.authn_kinds(&req.method, &req.route_path);
        match kinds {
            None => {
                debug!(path = %req.route_path, "Public route, skipping authentication");
            }
            Some(kinds) => {
                // A route may accept several schemes; the first one that
                // verifies wins. With one scheme defined today this is a
                // plain loop.
                let mut last_err =
                    ServiceError::Unauthenticated("no authentication scheme matched".to_string());
                let mut verified = false;
                for kind in kinds {
                    match kind {
                        AuthKind::Bearer => {
                            match Self::bearer_token(req).and_then(|t| self.codec.verify(t)) {
                                Ok(claims) => {
                                    ctx.roles = claims.roles;
                                    ctx.identity = claims.identity;
                                    verified = true;
                                    break;
                                }
                                Err(e) => last_err = e,
                            }
                        }
                    }
                }
                if !verified {
                    return Err(last_err);
                }
            }
        }
        next.run(req, ctx)
    }
}
