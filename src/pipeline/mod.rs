//! # Request Pipeline
//!
//! Every request flows through an ordered chain of stages before reaching
//! its handler:
//!
//! ```mermaid
//! sequenceDiagram
//!     participant S as Server
//!     participant C as Correlation
//!     participant An as Authentication
//!     participant Az as Authorization
//!     participant D as Data
//!     participant V as Validation
//!     participant T as Transaction
//!     participant H as Handler
//!
//!     S->>C: ServiceRequest
//!     C->>An: request id assigned
//!     An->>Az: claims verified
//!     Az->>D: roles / identities checked
//!     D->>V: body captured
//!     V->>T: params + schema validated
//!     T->>H: transaction open
//!     H-->>T: payload or error
//!     T-->>S: commit / rollback, envelope
//! ```
//!
//! Each stage either passes the request down the chain via [`Next`] or
//! short-circuits with an error; a short-circuit skips every later stage
//! and the handler. The pipeline converts the final result, success or
//! error, into the response envelope `{error?, pagination?, data?}` with
//! the correlation id echoed in the `x-request-id` header.
//!
//! Stages are objects, not nested closures, so the chain is inspectable
//! and each stage is unit-testable in isolation.

mod authn;
mod authz;
mod correlation;
mod data;
mod tx;
mod validate;

pub use authn::AuthnStage;
pub use authz::AuthzStage;
pub use correlation::CorrelationStage;
pub use data::DataStage;
pub use tx::TxStage;
pub use validate::ValidateStage;

use http::Method;
use serde_json::{json, Value};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::error;

use crate::auth::AuthCodec;
use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::registry::RouteRegistry;
use crate::router::ParamVec;
use crate::store::StoreProvider;

/// Inline capacity for request headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Header name/value pairs, inline up to [`MAX_INLINE_HEADERS`] entries.
/// Names are lowercased at parse time.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// An incoming request as seen by the pipeline and handlers.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    pub method: Method,
    /// Actual request path, e.g. `/pets/42`.
    pub path: String,
    /// Matched route pattern, e.g. `/pets/{id}`. Cache key for every
    /// per-route lookup.
    pub route_path: Arc<str>,
    pub path_params: ParamVec,
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub body: Option<Vec<u8>>,
}

impl ServiceRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path parameter lookup. Last write wins on duplicates.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter lookup. Last write wins on duplicates.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// What a handler returns on success: a status, an optional data payload,
/// and optional pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerPayload {
    pub status: u16,
    pub data: Option<Value>,
    pub pagination: Option<Value>,
}

impl HandlerPayload {
    /// 200 with a data payload.
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            data: Some(data),
            pagination: None,
        }
    }

    /// 201 with a data payload.
    pub fn created(data: Value) -> Self {
        Self {
            status: 201,
            data: Some(data),
            pagination: None,
        }
    }

    /// 204 with no payload.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            data: None,
            pagination: None,
        }
    }

    #[must_use]
    pub fn with_pagination(mut self, pagination: Value) -> Self {
        self.pagination = Some(pagination);
        self
    }
}

/// A fully formed response: status, headers, and the envelope body.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub headers: HeaderVec,
    pub body: Value,
}

impl ServiceResponse {
    fn new(status: u16, body: Value, ctx: &RequestContext) -> Self {
        let mut headers = HeaderVec::new();
        headers.push((
            Arc::<str>::from("x-request-id"),
            ctx.request_id.to_string(),
        ));
        Self {
            status,
            headers,
            body,
        }
    }

    /// Success envelope from a handler payload.
    pub fn from_payload(payload: HandlerPayload, ctx: &RequestContext) -> Self {
        let mut envelope = serde_json::Map::new();
        if let Some(pagination) = payload.pagination {
            envelope.insert("pagination".to_string(), pagination);
        }
        if let Some(data) = payload.data {
            envelope.insert("data".to_string(), data);
        }
        Self::new(payload.status, Value::Object(envelope), ctx)
    }

    /// Error envelope. Internal detail never reaches the client.
    pub fn from_error(err: &ServiceError, ctx: &RequestContext) -> Self {
        let mut error = serde_json::Map::new();
        error.insert("code".to_string(), json!(err.code()));
        error.insert("detail".to_string(), json!(err.client_detail()));
        if let Some(fields) = err.validation_errors() {
            error.insert("validationErrors".to_string(), json!(fields));
        }
        Self::new(err.status(), json!({ "error": error }), ctx)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.push((Arc::<str>::from(name), value.into()));
    }
}

/// Terminal request handler. Implemented for plain functions too.
pub trait Handler: Send + Sync {
    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
    ) -> Result<HandlerPayload, ServiceError>;
}

impl<F> Handler for F
where
    F: Fn(&ServiceRequest, &mut RequestContext) -> Result<HandlerPayload, ServiceError>
        + Send
        + Sync,
{
    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
    ) -> Result<HandlerPayload, ServiceError> {
        self(req, ctx)
    }
}

/// One pipeline stage. A stage runs its check, then either calls
/// `next.run(..)` to continue or returns an error to short-circuit.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError>;
}

/// The remainder of the chain from a stage's point of view.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    handler: &'a dyn Handler,
}

impl Next<'_> {
    /// Run the rest of the chain. When no stages remain the handler runs
    /// and its payload becomes the success envelope.
    pub fn run(
        self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
    ) -> Result<ServiceResponse, ServiceError> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(
                req,
                ctx,
                Next {
                    stages: rest,
                    handler: self.handler,
                },
            ),
            None => {
                let payload = self.handler.handle(req, ctx)?;
                Ok(ServiceResponse::from_payload(payload, ctx))
            }
        }
    }
}

/// An ordered stage chain plus the error-to-envelope conversion.
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The standard chain: correlation, authentication, authorization,
    /// data, validation, transaction.
    pub fn standard(
        registry: Arc<RouteRegistry>,
        codec: Arc<AuthCodec>,
        provider: Arc<dyn StoreProvider>,
    ) -> Self {
        Self::new(vec![
            Arc::new(CorrelationStage),
            Arc::new(AuthnStage::new(Arc::clone(&registry), codec)),
            Arc::new(AuthzStage::new(Arc::clone(&registry))),
            Arc::new(DataStage),
            Arc::new(ValidateStage::new(registry)),
            Arc::new(TxStage::new(provider)),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run a request through the chain to `handler`. Errors become the
    /// error envelope; nothing escapes as a panic or a bare error.
    pub fn run(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        handler: &dyn Handler,
    ) -> ServiceResponse {
        let next = Next {
            stages: &self.stages,
            handler,
        };
        match next.run(req, ctx) {
            Ok(response) => response,
            Err(err) => {
                if err.status() >= 500 {
                    error!(request_id = %ctx.request_id, error = %err, "Request failed");
                }
                ServiceResponse::from_error(&err, ctx)
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}
