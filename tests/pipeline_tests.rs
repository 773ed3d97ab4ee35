//! End-to-end pipeline tests: the standard stage chain against an
//! in-memory store, exercising authentication, authorization, validation,
//! and transaction settlement together.

mod common;

use common::{identity, request, MockStore, TxCounters};
use http::Method;
use serde_json::{json, Map};
use servkit::auth::AuthCodec;
use servkit::context::RequestContext;
use servkit::errors::ServiceError;
use servkit::pipeline::{HandlerPayload, Pipeline, ServiceRequest, ServiceResponse};
use servkit::registry::{MiddlewareConfig, PathParamRule, RouteConfig, RouteRegistry};
use servkit::schema_cache::{SchemaCache, SchemaRef};
use servkit::store::StoreProvider;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

struct Fixture {
    registry: Arc<RouteRegistry>,
    codec: Arc<AuthCodec>,
    counters: Arc<TxCounters>,
    pipeline: Pipeline,
}

fn fixture(routes: Vec<RouteConfig>) -> Fixture {
    let registry = Arc::new(RouteRegistry::new(Arc::new(SchemaCache::default())));
    for route in routes {
        registry.register(route).unwrap();
    }
    let codec = Arc::new(AuthCodec::new("integration-secret", 3600));
    let store = MockStore::new();
    let counters = Arc::clone(&store.counters);
    let pipeline = Pipeline::standard(
        Arc::clone(&registry),
        Arc::clone(&codec),
        Arc::new(store) as Arc<dyn StoreProvider>,
    );
    Fixture {
        registry,
        codec,
        counters,
        pipeline,
    }
}

fn querying_route(method: Method, path: &str, mw: MiddlewareConfig) -> RouteConfig {
    RouteConfig {
        method,
        path: path.to_string(),
        handler: Arc::new(
            |_req: &ServiceRequest,
             ctx: &mut RequestContext|
             -> Result<HandlerPayload, ServiceError> {
                let rows = ctx.tx.query("SELECT 1 ", &serde_json::Map::new())?;
                Ok(HandlerPayload::ok(json!(rows)))
            },
        ),
        middleware: mw,
    }
}

fn failing_route(method: Method, path: &str, mw: MiddlewareConfig) -> RouteConfig {
    RouteConfig {
        method,
        path: path.to_string(),
        handler: Arc::new(
            |_req: &ServiceRequest,
             _ctx: &mut RequestContext|
             -> Result<HandlerPayload, ServiceError> { Err(ServiceError::NotFound) },
        ),
        middleware: mw,
    }
}

fn run(f: &Fixture, req: &ServiceRequest) -> ServiceResponse {
    let route = f
        .registry
        .get(&req.method, req.route_path.as_ref())
        .expect("route registered");
    let mut ctx = RequestContext::new();
    f.pipeline.run(req, &mut ctx, route.handler.as_ref())
}

#[test]
fn test_success_commits_and_wraps_envelope() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/pets",
        MiddlewareConfig::default(),
    )]);
    let resp = run(&f, &request(Method::GET, "/pets", "/pets", &[], None));
    assert_eq!(resp.status, 200);
    assert!(resp.body.get("data").is_some());
    assert!(resp.body.get("error").is_none());
    assert_eq!(f.counters.commits(), 1);
    assert_eq!(f.counters.rollbacks(), 0);
}

#[test]
fn test_handler_error_rolls_back() {
    let f = fixture(vec![failing_route(
        Method::GET,
        "/pets",
        MiddlewareConfig::default(),
    )]);
    let resp = run(&f, &request(Method::GET, "/pets", "/pets", &[], None));
    assert_eq!(resp.status, 404);
    assert_eq!(resp.body["error"]["code"], json!("NOT_FOUND"));
    assert_eq!(f.counters.commits(), 0);
    assert_eq!(f.counters.rollbacks(), 1);
}

#[test]
fn test_public_route_needs_no_token() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/pets",
        MiddlewareConfig::default(),
    )]);
    let resp = run(&f, &request(Method::GET, "/pets", "/pets", &[], None));
    assert_eq!(resp.status, 200);
}

#[test]
fn test_protected_route_rejects_missing_and_bad_tokens() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/pets",
        MiddlewareConfig {
            authentication: vec!["bearer".to_string()],
            ..Default::default()
        },
    )]);

    let resp = run(&f, &request(Method::GET, "/pets", "/pets", &[], None));
    assert_eq!(resp.status, 401);
    // No transaction was opened for a rejected request.
    assert_eq!(f.counters.begins.load(std::sync::atomic::Ordering::SeqCst), 0);

    let forged = AuthCodec::new("other", 3600)
        .issue(vec![], Map::new())
        .unwrap();
    let resp = run(
        &f,
        &request(
            Method::GET,
            "/pets",
            "/pets",
            &[("authorization", &format!("Bearer {forged}"))],
            None,
        ),
    );
    assert_eq!(resp.status, 401);
}

#[test]
fn test_expired_token_is_401() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/pets",
        MiddlewareConfig {
            authentication: vec!["bearer".to_string()],
            ..Default::default()
        },
    )]);
    let now = chrono::Utc::now().timestamp();
    let stale = servkit::auth::Claims {
        roles: vec!["reader".to_string()],
        identity: Map::new(),
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = f.codec.encode(&stale).unwrap();
    let resp = run(
        &f,
        &request(
            Method::GET,
            "/pets",
            "/pets",
            &[("authorization", &format!("Bearer {token}"))],
            None,
        ),
    );
    assert_eq!(resp.status, 401);
    assert_eq!(resp.body["error"]["code"], json!("UNAUTHENTICATED"));
}

#[test]
fn test_role_requirements_enforced() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/admin",
        MiddlewareConfig {
            authentication: vec!["bearer".to_string()],
            require_all_roles: vec!["admin".to_string()],
            ..Default::default()
        },
    )]);

    let reader = f
        .codec
        .issue(vec!["reader".to_string()], Map::new())
        .unwrap();
    let resp = run(
        &f,
        &request(
            Method::GET,
            "/admin",
            "/admin",
            &[("authorization", &format!("Bearer {reader}"))],
            None,
        ),
    );
    assert_eq!(resp.status, 403);

    let admin = f
        .codec
        .issue(vec!["admin".to_string(), "reader".to_string()], Map::new())
        .unwrap();
    let resp = run(
        &f,
        &request(
            Method::GET,
            "/admin",
            "/admin",
            &[("authorization", &format!("Bearer {admin}"))],
            None,
        ),
    );
    assert_eq!(resp.status, 200);
}

#[test]
fn test_path_param_identity_matching() {
    let mut path_params = HashMap::new();
    path_params.insert(
        "customer_id".to_string(),
        PathParamRule {
            match_identity: true,
        },
    );
    let f = fixture(vec![querying_route(
        Method::GET,
        "/customers/{customer_id}",
        MiddlewareConfig {
            authentication: vec!["bearer".to_string()],
            path_params,
            ..Default::default()
        },
    )]);

    let token = f
        .codec
        .issue(vec![], identity("customer_id", "c-1"))
        .unwrap();
    let auth = format!("Bearer {token}");

    let mut own = request(
        Method::GET,
        "/customers/c-1",
        "/customers/{customer_id}",
        &[("authorization", &auth)],
        None,
    );
    own.path_params
        .push((Arc::<str>::from("customer_id"), "c-1".to_string()));
    assert_eq!(run(&f, &own).status, 200);

    let mut other = request(
        Method::GET,
        "/customers/c-2",
        "/customers/{customer_id}",
        &[("authorization", &auth)],
        None,
    );
    other
        .path_params
        .push((Arc::<str>::from("customer_id"), "c-2".to_string()));
    let resp = run(&f, &other);
    assert_eq!(resp.status, 403);
    assert_eq!(f.counters.rollbacks(), 0);
}

#[test]
fn test_query_whitelist_end_to_end() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/pets",
        MiddlewareConfig {
            allowed_query_params: Some(vec!["status".to_string()]),
            ..Default::default()
        },
    )]);

    let mut ok = request(Method::GET, "/pets", "/pets", &[], None);
    ok.query_params
        .push((Arc::<str>::from("status"), "created".to_string()));
    assert_eq!(run(&f, &ok).status, 200);

    let mut bad = request(Method::GET, "/pets", "/pets", &[], None);
    bad.query_params
        .push((Arc::<str>::from("owner"), "me".to_string()));
    let resp = run(&f, &bad);
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["error"]["code"], json!("INVALID_QUERY_PARAM"));
}

#[test]
fn test_schema_validation_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("pet.json");
    let mut file = std::fs::File::create(&schema_path).unwrap();
    file.write_all(
        json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        })
        .to_string()
        .as_bytes(),
    )
    .unwrap();

    let f = fixture(vec![querying_route(
        Method::POST,
        "/pets",
        MiddlewareConfig {
            request_schema: Some(SchemaRef::new(schema_path)),
            ..Default::default()
        },
    )]);

    let resp = run(
        &f,
        &request(
            Method::POST,
            "/pets",
            "/pets",
            &[],
            Some(br#"{"name":"Rex"}"#),
        ),
    );
    assert_eq!(resp.status, 200);

    let resp = run(&f, &request(Method::POST, "/pets", "/pets", &[], Some(b"{}")));
    assert_eq!(resp.status, 400);
    assert_eq!(resp.body["error"]["code"], json!("SCHEMA_VALIDATION"));
    let violations = resp.body["error"]["validationErrors"].as_array().unwrap();
    assert_eq!(violations.len(), 1);
    // Validation failures never reach the store.
    assert_eq!(f.counters.rollbacks(), 0);
}

#[test]
fn test_request_id_echoed_on_every_outcome() {
    let f = fixture(vec![querying_route(
        Method::GET,
        "/pets",
        MiddlewareConfig::default(),
    )]);
    let rid = servkit::ids::RequestId::new().to_string();
    let resp = run(
        &f,
        &request(
            Method::GET,
            "/pets",
            "/pets",
            &[("x-request-id", &rid)],
            None,
        ),
    );
    assert!(resp
        .headers
        .iter()
        .any(|(k, v)| k.as_ref() == "x-request-id" && *v == rid));
}
