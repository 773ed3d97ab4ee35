//! # Error Taxonomy
//!
//! One closed error enum for everything a pipeline stage or handler can fail
//! with, together with the HTTP status each variant surfaces as.
//!
//! ## Design
//!
//! There is no centralized error translator downstream of the pipeline: each
//! stage constructs the precise [`ServiceError`] variant for its failure, and
//! the variant itself carries the status code and the wire-safe detail. An
//! `Internal` cause is logged server-side and never echoed to the client.
//!
//! ## Status mapping
//!
//! | Variant | Status |
//! |---|---|
//! | `SchemaValidation`, `InvalidJson`, `InvalidQueryParam`, `InvalidPathParam` | 400 |
//! | `Unauthenticated` | 401 |
//! | `Unauthorized` | 403 |
//! | `NotFound` | 404 |
//! | `Internal`, `Config` | 500 |
//! | `Unavailable` | 503 |

use serde::Serialize;
use thiserror::Error;

/// A single schema violation, addressed by a JSON-pointer-like data path.
///
/// Serialized inside the response envelope as
/// `{"dataPath": "/name", "message": "must not be empty"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// JSON pointer to the violating field in the request body.
    #[serde(rename = "dataPath")]
    pub data_path: String,
    /// Human-readable description with the redundant field prefix stripped.
    pub message: String,
}

impl FieldError {
    pub fn new(data_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data_path: data_path.into(),
            message: message.into(),
        }
    }
}

/// Everything a request can fail with, from any pipeline stage or handler.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request body did not conform to the declared schema.
    #[error("schema validation failed ({} violation(s))", .0.len())]
    SchemaValidation(Vec<FieldError>),

    /// The request body was not parseable JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// A query parameter was not in the route's allow-list.
    #[error("query parameter '{0}' is not allowed")]
    InvalidQueryParam(String),

    /// A declared path parameter was missing or malformed.
    #[error("invalid path parameter '{0}'")]
    InvalidPathParam(String),

    /// No route or resource matched the request.
    #[error("not found")]
    NotFound,

    /// The caller is authenticated but does not meet the route's requirements.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials were missing, malformed, expired, or failed verification.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A collaborator (store, backend) is temporarily unable to serve.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Unexpected server-side failure. The cause is logged, never echoed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Invalid service configuration. Raised at registration/startup, fatal.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// HTTP status code this error surfaces as.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::SchemaValidation(_)
            | ServiceError::InvalidJson(_)
            | ServiceError::InvalidQueryParam(_)
            | ServiceError::InvalidPathParam(_) => 400,
            ServiceError::Unauthenticated(_) => 401,
            ServiceError::Unauthorized(_) => 403,
            ServiceError::NotFound => 404,
            ServiceError::Internal(_) | ServiceError::Config(_) => 500,
            ServiceError::Unavailable(_) => 503,
        }
    }

    /// Stable machine-readable code for the response envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::SchemaValidation(_) => "SCHEMA_VALIDATION",
            ServiceError::InvalidJson(_) => "INVALID_JSON",
            ServiceError::InvalidQueryParam(_) => "INVALID_QUERY_PARAM",
            ServiceError::InvalidPathParam(_) => "INVALID_PATH_PARAM",
            ServiceError::NotFound => "NOT_FOUND",
            ServiceError::Unauthorized(_) => "UNAUTHORIZED",
            ServiceError::Unauthenticated(_) => "UNAUTHENTICATED",
            ServiceError::Unavailable(_) => "UNAVAILABLE",
            ServiceError::Internal(_) | ServiceError::Config(_) => "INTERNAL",
        }
    }

    /// The detail string safe to return to the client.
    ///
    /// Internal and configuration causes are replaced by a generic message;
    /// the real cause is only ever logged server-side.
    #[must_use]
    pub fn client_detail(&self) -> String {
        match self {
            ServiceError::Internal(_) | ServiceError::Config(_) => {
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Per-field violations, present only for `SchemaValidation`.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&[FieldError]> {
        match self {
            ServiceError::SchemaValidation(errors) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceError::SchemaValidation(vec![]).status(), 400);
        assert_eq!(ServiceError::InvalidJson("x".into()).status(), 400);
        assert_eq!(ServiceError::InvalidQueryParam("q".into()).status(), 400);
        assert_eq!(ServiceError::InvalidPathParam("p".into()).status(), 400);
        assert_eq!(ServiceError::Unauthenticated("no token".into()).status(), 401);
        assert_eq!(ServiceError::Unauthorized("missing role".into()).status(), 403);
        assert_eq!(ServiceError::NotFound.status(), 404);
        assert_eq!(ServiceError::Internal("boom".into()).status(), 500);
        assert_eq!(ServiceError::Unavailable("store down".into()).status(), 503);
    }

    #[test]
    fn test_internal_cause_not_echoed() {
        let err = ServiceError::Internal("password was hunter2".into());
        assert!(!err.client_detail().contains("hunter2"));
        // The server-side Display still carries the cause for logging.
        assert!(err.to_string().contains("hunter2"));
    }

    #[test]
    fn test_field_error_serialization() {
        let fe = FieldError::new("/name", "must not be empty");
        let json = serde_json::to_value(&fe).unwrap();
        assert_eq!(json["dataPath"], "/name");
        assert_eq!(json["message"], "must not be empty");
    }
}
