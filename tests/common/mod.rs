//! Shared fixtures for integration tests: an in-memory store provider
//! that counts transaction outcomes, and registry/request builders.
#![allow(dead_code)]

use serde_json::{json, Map, Value};
use servkit::errors::ServiceError;
use servkit::pipeline::{HeaderVec, ServiceRequest};
use servkit::store::{Accessor, BoundParams, StoreProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Transaction outcome counters shared between a test and its provider.
#[derive(Default)]
pub struct TxCounters {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
}

impl TxCounters {
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

struct MockAccessor {
    counters: Arc<TxCounters>,
}

impl Accessor for MockAccessor {
    fn query(&mut self, sql: &str, params: &BoundParams) -> Result<Vec<Value>, ServiceError> {
        Ok(vec![json!({"sql": sql, "params": params})])
    }

    fn execute(&mut self, _sql: &str, _params: &BoundParams) -> Result<u64, ServiceError> {
        Ok(1)
    }

    fn commit(&mut self) -> Result<(), ServiceError> {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ServiceError> {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store provider whose accessors echo queries back and count outcomes.
pub struct MockStore {
    pub counters: Arc<TxCounters>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(TxCounters::default()),
        }
    }
}

impl StoreProvider for MockStore {
    fn begin(&self) -> Result<Box<dyn Accessor>, ServiceError> {
        self.counters.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockAccessor {
            counters: Arc::clone(&self.counters),
        }))
    }
}

/// Build a request for a registered route.
pub fn request(
    method: http::Method,
    path: &str,
    route_path: &str,
    headers: &[(&str, &str)],
    body: Option<&[u8]>,
) -> ServiceRequest {
    let mut header_vec = HeaderVec::new();
    for (k, v) in headers {
        header_vec.push((Arc::<str>::from(*k), (*v).to_string()));
    }
    ServiceRequest {
        method,
        path: path.to_string(),
        route_path: Arc::<str>::from(route_path),
        path_params: servkit::router::ParamVec::new(),
        query_params: servkit::router::ParamVec::new(),
        headers: header_vec,
        body: body.map(<[u8]>::to_vec),
    }
}

/// Identity map with a single fact.
pub fn identity(key: &str, value: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert(key.to_string(), json!(value));
    m
}
