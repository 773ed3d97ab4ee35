//! # servkit
//!
//! A construction kit for JSON backend services: a fixed per-request
//! middleware pipeline, declarative per-route configuration, signed
//! claims authentication, transaction-per-request store access, and a
//! dynamic query translator, served over a coroutine HTTP runtime.
//!
//! ## Request flow
//!
//! ```mermaid
//! graph LR
//!     A[Server] --> B[Correlation]
//!     B --> C[Authentication]
//!     C --> D[Authorization]
//!     D --> E[Data]
//!     E --> F[Validation]
//!     F --> G[Transaction]
//!     G --> H[Handler]
//! ```
//!
//! Routes are registered in a [`registry::RouteRegistry`] with their
//! middleware configuration; the [`router::Router`] matches paths and
//! extracts parameters; the [`pipeline::Pipeline`] runs the stage chain
//! and wraps every outcome in the `{error?, pagination?, data?}` response
//! envelope. Handlers reach the backing store only through the
//! per-request transaction slot, which is committed or rolled back by the
//! pipeline, never by the handler.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use servkit::auth::AuthCodec;
//! use servkit::config::ServiceConfig;
//! use servkit::pipeline::{HandlerPayload, Pipeline};
//! use servkit::registry::{MiddlewareConfig, RouteConfig, RouteRegistry};
//! use servkit::schema_cache::SchemaCache;
//! use servkit::server::AppService;
//! use servkit::store::{Accessor, StoreProvider};
//! use servkit::errors::ServiceError;
//! use std::sync::Arc;
//!
//! # struct MyProvider;
//! # impl StoreProvider for MyProvider {
//! #     fn begin(&self) -> Result<Box<dyn Accessor>, ServiceError> { unimplemented!() }
//! # }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! servkit::telemetry::init();
//! let config = ServiceConfig::from_env();
//!
//! let registry = Arc::new(RouteRegistry::new(Arc::new(SchemaCache::default())));
//! registry.register(RouteConfig {
//!     method: http::Method::GET,
//!     path: "/pets/{id}".to_string(),
//!     handler: Arc::new(|_req: &servkit::pipeline::ServiceRequest,
//!                        ctx: &mut servkit::context::RequestContext|
//!      -> Result<HandlerPayload, ServiceError> {
//!         let rows = ctx.tx.query(
//!             "SELECT * FROM pets WHERE id = :id ",
//!             &serde_json::Map::new(),
//!         )?;
//!         Ok(HandlerPayload::ok(serde_json::json!(rows)))
//!     }),
//!     middleware: MiddlewareConfig {
//!         authentication: vec!["bearer".to_string()],
//!         ..Default::default()
//!     },
//! })?;
//!
//! let codec = Arc::new(AuthCodec::new("secret", config.token_ttl_secs));
//! let pipeline = Arc::new(Pipeline::standard(
//!     Arc::clone(&registry),
//!     codec,
//!     Arc::new(MyProvider),
//! ));
//! let service = AppService::new(registry, pipeline)?;
//! let handle = servkit::server::start(service, config.bind_addr.as_str(), &config)?;
//! handle.join().ok();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod errors;
pub mod ids;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod router;
pub mod schema_cache;
pub mod server;
pub mod store;
pub mod telemetry;

pub use auth::{AuthCodec, AuthKind, Claims};
pub use config::ServiceConfig;
pub use context::RequestContext;
pub use errors::{FieldError, ServiceError};
pub use ids::RequestId;
pub use pipeline::{Handler, HandlerPayload, Pipeline, ServiceRequest, ServiceResponse, Stage};
pub use query::translate;
pub use registry::{MiddlewareConfig, PathParamRule, RouteConfig, RouteRegistry};
pub use router::{RouteMatch, Router};
pub use schema_cache::{SchemaCache, SchemaRef};
pub use store::{Accessor, BoundParams, StoreProvider, TxSlot};
