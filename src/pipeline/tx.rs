//! Transaction stage. Opens a store transaction before the rest of the
//! chain runs and settles it afterwards: commit when the handler
//! succeeded, rollback when anything downstream failed. Exactly one of
//! the two happens per request.

use std::sync::Arc;
use tracing::warn;

use super::{Next, ServiceRequest, ServiceResponse, Stage};
use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::store::StoreProvider;

pub struct TxStage {
    provider: Arc<dyn StoreProvider>,
}

impl TxStage {
    pub fn new(provider: Arc<dyn StoreProvider>) -> Self {
        Self { provider }
    }
}

impl Stage for TxStage {
    fn name(&self) -> &'static str {
        "tx"
    }

    fn handle(
        &self,
        req: &ServiceRequest,
        ctx: &mut RequestContext,
        next: Next<'_>,
    ) -> Result<ServiceResponse, ServiceError> {
        // Providers report their own Unavailable; anything else is still a
        // failure to begin.
        let accessor = self.provider.begin()?;
        ctx.tx.open(accessor)?;

        match next.run(req, ctx) {
            Ok(response) => {
                ctx.tx
                    .commit()
                    .map_err(|_| ServiceError::Internal("transaction commit failed".to_string()))?;
                Ok(response)
            }
            Err(err) => {
                // The handler's error is the one the caller sees; a failed
                // rollback is only logged.
                if let Err(rb) = ctx.tx.rollback() {
                    warn!(request_id = %ctx.request_id, error = %rb, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{HandlerPayload, HeaderVec, Pipeline};
    use crate::router::ParamVec;
    use crate::store::{Accessor, BoundParams};
    use http::Method;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    struct CountingAccessor {
        counters: Arc<Counters>,
        fail_commit: bool,
    }

    impl Accessor for CountingAccessor {
        fn query(&mut self, _sql: &str, _params: &BoundParams) -> Result<Vec<Value>, ServiceError> {
            Ok(vec![json!({"row": 1})])
        }
        fn execute(&mut self, _sql: &str, _params: &BoundParams) -> Result<u64, ServiceError> {
            Ok(1)
        }
        fn commit(&mut self) -> Result<(), ServiceError> {
            if self.fail_commit {
                return Err(ServiceError::Internal("commit refused".to_string()));
            }
            self.counters.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), ServiceError> {
            self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingProvider {
        counters: Arc<Counters>,
        fail_begin: bool,
        fail_commit: bool,
    }

    impl StoreProvider for CountingProvider {
        fn begin(&self) -> Result<Box<dyn Accessor>, ServiceError> {
            if self.fail_begin {
                return Err(ServiceError::Unavailable("no connection".to_string()));
            }
            Ok(Box::new(CountingAccessor {
                counters: Arc::clone(&self.counters),
                fail_commit: self.fail_commit,
            }))
        }
    }

    fn request() -> ServiceRequest {
        ServiceRequest {
            method: Method::GET,
            path: "/pets".to_string(),
            route_path: Arc::<str>::from("/pets"),
            path_params: ParamVec::new(),
            query_params: ParamVec::new(),
            headers: HeaderVec::new(),
            body: None,
        }
    }

    fn run_with(
        provider: CountingProvider,
        handler: impl Fn(&ServiceRequest, &mut RequestContext) -> Result<HandlerPayload, ServiceError>
            + Send
            + Sync,
    ) -> ServiceResponse {
        let pipeline =
            Pipeline::new(vec![Arc::new(TxStage::new(Arc::new(provider))) as Arc<dyn Stage>]);
        let mut ctx = RequestContext::new();
        pipeline.run(&request(), &mut ctx, &handler)
    }

    #[test]
    fn test_success_commits_once() {
        let counters = Arc::new(Counters::default());
        let resp = run_with(
            CountingProvider {
                counters: Arc::clone(&counters),
                fail_begin: false,
                fail_commit: false,
            },
            |_req, ctx| {
                let rows = ctx.tx.query("SELECT 1", &BoundParams::new())?;
                Ok(HandlerPayload::ok(json!(rows)))
            },
        );
        assert_eq!(resp.status, 200);
        assert_eq!(counters.commits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.rollbacks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_error_rolls_back_once() {
        let counters = Arc::new(Counters::default());
        let resp = run_with(
            CountingProvider {
                counters: Arc::clone(&counters),
                fail_begin: false,
                fail_commit: false,
            },
            |_req, _ctx| Err(ServiceError::NotFound),
        );
        assert_eq!(resp.status, 404);
        assert_eq!(counters.commits.load(Ordering::SeqCst), 0);
        assert_eq!(counters.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_begin_failure_is_503() {
        let counters = Arc::new(Counters::default());
        let resp = run_with(
            CountingProvider {
                counters: Arc::clone(&counters),
                fail_begin: true,
                fail_commit: false,
            },
            |_req, _ctx| Ok(HandlerPayload::no_content()),
        );
        assert_eq!(resp.status, 503);
        assert_eq!(resp.body["error"]["code"], json!("UNAVAILABLE"));
    }

    #[test]
    fn test_commit_failure_is_500() {
        let counters = Arc::new(Counters::default());
        let resp = run_with(
            CountingProvider {
                counters: Arc::clone(&counters),
                fail_begin: false,
                fail_commit: true,
            },
            |_req, _ctx| Ok(HandlerPayload::no_content()),
        );
        assert_eq!(resp.status, 500);
        assert_eq!(counters.rollbacks.load(Ordering::SeqCst), 0);
    }
}
