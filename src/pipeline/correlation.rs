//! Correlation stage. Adopts the caller's `x-request-id` when present and
//! well formed, otherwise mints a fresh id, and opens a tracing span so
//! every downstream log line carries the id.

use tracing::info_span;

use super::{Next, ServiceRequest, ServiceResponse, Stage};
use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::ids::RequestId;

pub struct CorrelationStage;

impl Stage for CorrelationStage {
    fn name(&self) -> &'static str {
        "correlation"
    }

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError> {
        ctx.request_id = RequestId::from_header_or_new(req.header("x-request-id"));
        let span = info_span!(
            "request",
            request_id = %ctx.request_id,
            method = %req.method,
            path = %req.path,
        );
        let _guard = span.enter();
        next.run(req, ctx)
    }
}
