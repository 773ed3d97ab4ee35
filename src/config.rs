//! # Service Configuration Module
//!
//! Environment variable-based configuration for a servkit service.
//!
//! ## Environment Variables
//!
//! ### `SERVKIT_SIGNING_KEY`
//!
//! Secret used to sign and verify claims tokens. Required for any route that
//! declares an authentication type; routes without one never touch it.
//!
//! ### `SERVKIT_TOKEN_TTL_SECS`
//!
//! Default lifetime of an issued claims token in seconds. Default: `3600`.
//!
//! ### `SERVKIT_STACK_SIZE`
//!
//! Stack size for request coroutines. Accepts decimal (`65536`) or
//! hexadecimal (`0x10000`). Default: `0x10000` (64 KB).
//!
//! Larger stacks support deeper call chains; smaller stacks reduce memory
//! for many concurrent coroutines. Tune to your handler complexity.
//!
//! ### `SERVKIT_BIND_ADDR`
//!
//! Address the HTTP server binds to. Default: `0.0.0.0:8080`.
//!
//! ## Usage
//!
//! ```rust
//! use servkit::config::ServiceConfig;
//!
//! let config = ServiceConfig::from_env();
//! println!("stack size: {} bytes", config.stack_size);
//! ```

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Service configuration loaded from environment variables.
///
/// Load once at startup with [`ServiceConfig::from_env()`] and pass by
/// reference into the components that need it.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Secret for the claims codec. `None` when `SERVKIT_SIGNING_KEY` is
    /// unset; constructing the codec then fails with a configuration error.
    pub signing_key: Option<String>,
    /// Default expiry for issued tokens, in seconds.
    pub token_ttl_secs: i64,
    /// Stack size for request coroutines in bytes.
    pub stack_size: usize,
    /// Bind address for the HTTP server.
    pub bind_addr: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = match env::var("SERVKIT_STACK_SIZE") {
            Ok(val) => {
                if let Some(hex) = val.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).unwrap_or(DEFAULT_STACK_SIZE)
                } else {
                    val.parse().unwrap_or(DEFAULT_STACK_SIZE)
                }
            }
            Err(_) => DEFAULT_STACK_SIZE,
        };
        let token_ttl_secs = env::var("SERVKIT_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        ServiceConfig {
            signing_key: env::var("SERVKIT_SIGNING_KEY").ok(),
            token_ttl_secs,
            stack_size,
            bind_addr: env::var("SERVKIT_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            signing_key: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            stack_size: DEFAULT_STACK_SIZE,
            bind_addr: DEFAULT_BIND_ADDR.into(),
        }
    }
}
