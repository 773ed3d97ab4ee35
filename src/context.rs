//! Per-request context threaded through the pipeline stages and into the
//! handler. Stages fill it in as the request advances: correlation sets the
//! request id, authentication sets roles and identity, the data stage
//! captures the raw body, and the transaction stage opens the slot.

use serde_json::{Map, Value};

use crate::ids::RequestId;
use crate::store::TxSlot;

/// Mutable state accumulated for one request.
#[derive(Debug, Default)]
pub struct RequestContext {
    /// Correlation id, present on every log line and response.
    pub request_id: RequestId,
    /// Roles from the verified claims token. Empty on public routes.
    pub roles: Vec<String>,
    /// Identity facts from the verified claims token.
    pub identity: Map<String, Value>,
    /// Raw request body bytes, captured before validation.
    pub raw_body: Option<Vec<u8>>,
    /// Per-request transaction slot, opened by the transaction stage.
    pub tx: TxSlot,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the verified claims include `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Look up a fact from the verified identity.
    pub fn identity_value(&self, key: &str) -> Option<&Value> {
        self.identity.get(key)
    }
}
