//! Response construction.
//!
//! # Responsibilities
//! - Turn a dispatched [`ProxyResponse`] into an HTTP response
//! - Stamp the proxied URL, resource class and cache policy headers
//! - Flag substituted payloads so clients can tell a stub from the real thing
//!
//! The permissive `Access-Control-Allow-Origin` header is added for every
//! route by the server's middleware stack, errors included.

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::dispatch::ProxyResponse;

pub const X_PROXIED_URL: HeaderName = HeaderName::from_static("x-proxied-url");
pub const X_PROXY_CLASS: HeaderName = HeaderName::from_static("x-proxy-class");
pub const X_PROXY_STUB: HeaderName = HeaderName::from_static("x-proxy-stub");

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.cache.header_value()) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        // Url serialization is always ASCII, so this only fails on control bytes.
        if let Ok(value) = HeaderValue::from_str(self.target.as_str()) {
            headers.insert(X_PROXIED_URL, value);
        }
        headers.insert(X_PROXY_CLASS, HeaderValue::from_static(self.class.as_str()));
        if let Some(reason) = self.stub {
            headers.insert(X_PROXY_STUB, HeaderValue::from_static(reason.as_str()));
        }

        response
    }
}
