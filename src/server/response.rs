//! Response writing: serializes a pipeline response onto the transport
//! with status line, content type, and any headers the pipeline set.

use may_minihttp::Response;
use serde_json::json;
use tracing::error;

use crate::context::RequestContext;
use crate::errors::ServiceError;
use crate::pipeline::ServiceResponse;

/// Reason phrase for the status codes this service emits.
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Write a pipeline response onto the transport.
pub fn write_response(res: &mut Response, response: &ServiceResponse) {
    res.status_code(response.status as usize, status_reason(response.status));
    res.header("Content-Type: application/json");
    for (name, value) in &response.headers {
        // The transport takes whole 'static header lines.
        let line = format!("{name}: {value}").into_boxed_str();
        res.header(Box::leak(line));
    }
    match serde_json::to_vec(&response.body) {
        Ok(bytes) => {
            res.body_vec(bytes);
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            res.status_code(500, status_reason(500));
            res.body_vec(
                json!({"error": {"code": "INTERNAL", "detail": "an internal error occurred"}})
                    .to_string()
                    .into_bytes(),
            );
        }
    }
}

/// Write an error envelope for failures outside the pipeline, such as an
/// unroutable path.
pub fn write_error(res: &mut Response, err: &ServiceError, ctx: &RequestContext) {
    let response = ServiceResponse::from_error(err, ctx);
    write_response(res, &response);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reasons() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(401), "Unauthorized");
        assert_eq!(status_reason(403), "Forbidden");
        assert_eq!(status_reason(503), "Service Unavailable");
        assert_eq!(status_reason(599), "Unknown");
    }
}
