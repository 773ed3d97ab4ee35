//! Data stage. Captures the raw request body into the context so the
//! validation stage and the handler read the same bytes, and the transport
//! buffer is touched exactly once.

use tracing::debug;

use super::{Next, ServiceRequest, ServiceResponse, Stage};
use crate::context::RequestContext;
use crate::errors::ServiceError;

pub struct DataStage;

impl Stage for DataStage {
    fn name(&self) -> &'static str {
        "data"
    }

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError> {
        ctx.raw_body = req.body.clone();
        if let Some(body) = &ctx.raw_body {
            debug!(bytes = body.len(), "Request body captured");
        }
        next.run(req, ctx)
    }
}
