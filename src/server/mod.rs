//! HTTP transport: request parsing, response writing, the service entry
//! point, and the coroutine server wrapper.

mod http_server;
mod request;
mod response;
mod service;

pub use http_server::{start, HttpServer, ServerHandle};
pub use request::{parse_query_params, parse_request, ParsedRequest};
pub use response::{status_reason, write_error, write_response};
pub use service::AppService;
