//! # Signed Claims Codec
//!
//! Issues and verifies the signed claims tokens carried by authenticated
//! requests. A token binds a set of roles (coarse-grained capabilities) and
//! an identity map (caller-specific facts such as a customer id) under an
//! HMAC signature, with issued-at and expiry timestamps.
//!
//! Verification is strict: an expired token, a bad signature, and a
//! malformed token all collapse into [`ServiceError::Unauthenticated`] so
//! the response never reveals which check failed.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::debug;

use crate::config::ServiceConfig;
use crate::errors::ServiceError;

/// Claims carried inside a signed token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Coarse-grained capabilities, checked by role-based authorization.
    pub roles: Vec<String>,
    /// Caller-specific facts, checked by identity-based authorization and
    /// path-parameter identity matching.
    pub identity: Map<String, Value>,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Authentication schemes a route can require. Parsing is closed; an
/// unknown scheme name in route configuration is a startup error, not a
/// silent pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthKind {
    /// Signed claims token in the `Authorization` header.
    Bearer,
}

impl FromStr for AuthKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bearer" => Ok(AuthKind::Bearer),
            other => Err(ServiceError::Config(format!(
                "unknown authentication scheme '{other}'"
            ))),
        }
    }
}

/// Encodes and verifies signed claims tokens with a shared secret.
pub struct AuthCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl_secs: i64,
}

static SHARED_CODEC: OnceCell<AuthCodec> = OnceCell::new();

impl AuthCodec {
    pub fn new(secret: &str, default_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl_secs,
        }
    }

    /// Process-wide codec built from service configuration, initialized on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if no signing key is configured.
    pub fn shared(config: &ServiceConfig) -> Result<&'static AuthCodec, ServiceError> {
        SHARED_CODEC.get_or_try_init(|| {
            let secret = config.signing_key.as_deref().ok_or_else(|| {
                ServiceError::Config("signing key not configured".to_string())
            })?;
            Ok(AuthCodec::new(secret, config.token_ttl_secs))
        })
    }

    /// Issue a token for the given roles and identity, valid for the
    /// configured TTL from now.
    pub fn issue(
        &self,
        roles: Vec<String>,
        identity: Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            roles,
            identity,
            iat: now,
            exp: now + self.default_ttl_secs,
        };
        self.encode(&claims)
    }

    /// Encode a prebuilt claims set. Exposed so tests can build tokens with
    /// arbitrary timestamps.
    pub fn encode(&self, claims: &Claims) -> Result<String, ServiceError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verify a token's signature and expiry and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthenticated`] for an expired, forged, or
    /// malformed token.
    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => {
                debug!(roles = ?data.claims.roles, "Token verified");
                Ok(data.claims)
            }
            Err(e) => {
                let reason = match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => "token expired",
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => "invalid signature",
                    _ => "invalid token",
                };
                Err(ServiceError::Unauthenticated(reason.to_string()))
            }
        }
    }
}

impl std::fmt::Debug for AuthCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCodec")
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish()
    }
}
