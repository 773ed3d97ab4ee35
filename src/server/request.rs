//! Raw request parsing: lifts a transport request into method, path,
//! lowercased headers, decoded query parameters, and body bytes.

use http::Method;
use may_minihttp::Request;
use std::io::Read;
use std::sync::Arc;

use crate::pipeline::HeaderVec;
use crate::router::ParamVec;

/// A transport request decoded far enough for routing and the pipeline.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    pub path: String,
    pub query_params: ParamVec,
    pub headers: HeaderVec,
    pub body: Option<Vec<u8>>,
}

/// Decode a transport request. Header names are lowercased so every later
/// lookup is byte-equality on the name.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = req
        .method()
        .parse::<Method>()
        .unwrap_or(Method::GET);

    let raw_path = req.path().to_string();
    let (path, query_params) = match raw_path.split_once('?') {
        Some((p, q)) => (p.to_string(), parse_query_params(q)),
        None => (raw_path, ParamVec::new()),
    };

    let mut headers = HeaderVec::new();
    for h in req.headers() {
        headers.push((
            Arc::<str>::from(h.name.to_ascii_lowercase()),
            String::from_utf8_lossy(h.value).into_owned(),
        ));
    }

    // Body last; reading it consumes the transport buffer.
    let mut buf = Vec::new();
    let body = match req.body().read_to_end(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf),
        Err(_) => None,
    };

    ParsedRequest {
        method,
        path,
        query_params,
        headers,
        body,
    }
}

/// Decode a query string into percent-decoded key/value pairs. Duplicates
/// are kept in order; lookups take the last one.
pub fn parse_query_params(query: &str) -> ParamVec {
    let mut params = ParamVec::new();
    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        params.push((Arc::<str>::from(k.as_ref()), v.into_owned()));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_decoding() {
        let params = parse_query_params("status=created&name=fido%20jr");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].0.as_ref(), "status");
        assert_eq!(params[0].1, "created");
        assert_eq!(params[1].1, "fido jr");
    }

    #[test]
    fn test_duplicate_keys_preserved_in_order() {
        let params = parse_query_params("tag=a&tag=b");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].1, "a");
        assert_eq!(params[1].1, "b");
    }

    #[test]
    fn test_empty_query() {
        assert!(parse_query_params("").is_empty());
    }
}
