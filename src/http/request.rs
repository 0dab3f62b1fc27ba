//! Inbound request helpers.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) unless the client sent one
//! - Parse the `/proxy` and `/resource` query strings
//! - Work out the origin clients reach the proxy at, so rewritten
//!   references point back here

use axum::extract::{rejection::QueryRejection, Query};
use axum::http::{header, HeaderMap, HeaderName, Request};
use serde::Deserialize;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::ProxyError;
use crate::render::RenderMode;
use crate::target::TargetUrl;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Request ID generator for tower-http's `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        id.parse().ok().map(RequestId::new)
    }
}

/// Read the request ID stamped by the middleware.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl RequestIdExt for HeaderMap {
    fn request_id(&self) -> &str {
        self.get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// Query string of `/proxy` and `/resource`.
#[derive(Debug, Default, Deserialize)]
pub struct TargetQuery {
    pub url: Option<String>,
    pub mode: Option<String>,
}

impl TargetQuery {
    /// Unwrap the extractor, reporting an undecodable query string
    /// (e.g. a repeated `url`) as an invalid target.
    pub fn from_extracted(extracted: Result<Query<Self>, QueryRejection>) -> Result<Self, ProxyError> {
        extracted
            .map(|Query(query)| query)
            .map_err(|rejection| ProxyError::InvalidUrl(rejection.body_text()))
    }

    /// Validated target; absent and blank values are both "missing".
    pub fn target(&self) -> Result<TargetUrl, ProxyError> {
        let raw = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(ProxyError::MissingUrl)?;
        TargetUrl::parse(raw)
    }

    pub fn mode(&self) -> Result<RenderMode, ProxyError> {
        self.mode.as_deref().unwrap_or_default().parse()
    }
}

/// `scheme://host[:port]` clients use to reach the proxy.
///
/// A configured public origin wins; otherwise the forwarding headers a
/// fronting load balancer sets, then `Host`.
pub fn proxy_origin(headers: &HeaderMap, public_origin: Option<&str>) -> String {
    if let Some(origin) = public_origin {
        return origin.trim_end_matches('/').to_string();
    }

    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let scheme = value(X_FORWARDED_PROTO).unwrap_or("http");
    let host = value(X_FORWARDED_HOST)
        .or_else(|| value(header::HOST.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

/// `Content-Type` of the inbound body, forwarded with API calls.
pub fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
