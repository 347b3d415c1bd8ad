//! Cross-origin headers for archive responses.
//!
//! Archive content is public and embedded by pages on other origins, so the
//! policy is fixed: any origin, `GET` and `OPTIONS`, and whatever request
//! headers the browser asks for.

use http::{HeaderMap, HeaderValue, Response, StatusCode};

use crate::body::{empty, ResponseBody};

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
}

const ANY_ORIGIN: &str = "*";
const ALLOWED_METHODS: &str = "GET, OPTIONS";

/// Applies the archive CORS policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsHeaderPolicy;

impl CorsHeaderPolicy {
    /// Creates the policy.
    pub fn new() -> Self {
        Self
    }

    /// Adds CORS headers to `response`.
    ///
    /// `Access-Control-Allow-Headers` echoes the request's
    /// `Access-Control-Request-Headers` verbatim and is only set when that
    /// header is present and non-empty.
    pub fn apply(&self, request: &HeaderMap, response: &mut HeaderMap) {
        response.insert(headers::ALLOW_ORIGIN, HeaderValue::from_static(ANY_ORIGIN));
        response.insert(
            headers::ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );

        if let Some(requested) = request.get(headers::REQUEST_HEADERS) {
            if !requested.is_empty() {
                response.insert(headers::ALLOW_HEADERS, requested.clone());
            }
        }
    }

    /// Answers an `OPTIONS` preflight: empty 200 carrying only CORS headers.
    pub fn preflight(&self, request: &HeaderMap) -> Response<ResponseBody> {
        let mut response = Response::new(empty());
        *response.status_mut() = StatusCode::OK;
        self.apply(request, response.headers_mut());
        response
    }
}
