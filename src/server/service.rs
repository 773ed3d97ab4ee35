//! The transport service: routes each request and hands it to the
//! pipeline. One instance is cloned per connection by the server runtime,
//! so all shared state lives behind `Arc`.

use may_minihttp::{HttpService, Request, Response};
use serde_json::json;
use std::io;
use std::sync::{Arc, RwLock};

use super::request::parse_request;
use super::response::{write_error, write_response};
use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::pipeline::{Pipeline, ServiceRequest, ServiceResponse};
use crate::registry::RouteRegistry;
use crate::router::Router;

/// HTTP entry point wiring the router, registry, and pipeline together.
#[derive(Clone)]
pub struct AppService {
    registry: Arc<RouteRegistry>,
    router: Arc<RwLock<Router>>,
    pipeline: Arc<Pipeline>,
}

impl AppService {
    /// Build the service, compiling the router from the registry's
    /// current routes.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if any route pattern fails to
    /// compile.
    pub fn new(registry: Arc<RouteRegistry>, pipeline: Arc<Pipeline>) -> Result<Self, ServiceError> {
        let router = Router::new(registry.routes())?;
        Ok(Self {
            registry,
            router: Arc::new(RwLock::new(router)),
            pipeline,
        })
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = parse_request(req);

        // Liveness probe, answered before routing.
        if parsed.method == http::Method::GET && parsed.path == "/health" {
            let response = ServiceResponse {
                status: 200,
                headers: crate::pipeline::HeaderVec::new(),
                body: json!({"data": {"status": "ok"}}),
            };
            write_response(res, &response);
            return Ok(());
        }

        let matched = match self.router.read() {
            Ok(router) => router.route(&parsed.method, &parsed.path),
            Err(_) => None,
        };

        let Some(matched) = matched else {
            let ctx = RequestContext::new();
            write_error(res, &ServiceError::NotFound, &ctx);
            return Ok(());
        };

        let service_req = ServiceRequest {
            method: parsed.method,
            path: parsed.path,
            route_path: Arc::<str>::from(matched.route.path.as_str()),
            path_params: matched.path_params,
            query_params: parsed.query_params,
            headers: parsed.headers,
            body: parsed.body,
        };

        let mut ctx = RequestContext::new();
        let response = self
            .pipeline
            .run(&service_req, &mut ctx, matched.route.handler.as_ref());
        write_response(res, &response);
        Ok(())
    }
}
