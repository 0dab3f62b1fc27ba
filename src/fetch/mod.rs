//! Direct fetch subsystem.
//!
//! # Data Flow
//! ```text
//! FetchRequest (target, method, body, class)
//!     → tracking check (204 / empty stub, no upstream traffic)
//!     → direct.rs (browser-like request, bounded timeout)
//!     → stub.rs (failed script/style → empty stub of the right type,
//!                HTML challenge page → empty stub)
//!     → FetchedResource (status, content type, body, cache policy)
//! ```
//!
//! # Design Decisions
//! - Graceful degradation: one broken asset never fails a page
//! - Only status, content type and body cross the proxy boundary; upstream
//!   policy headers are never forwarded

pub mod direct;
pub mod stub;

use axum::http::{Method, StatusCode};
use bytes::Bytes;

pub use direct::DirectFetcher;
pub use stub::StubReason;

use crate::classify::ResourceClass;
use crate::target::TargetUrl;

/// One upstream request handled by the [`DirectFetcher`].
#[derive(Debug)]
pub struct FetchRequest<'a> {
    pub target: &'a TargetUrl,
    pub method: Method,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
    pub class: ResourceClass,
}

impl<'a> FetchRequest<'a> {
    /// A plain GET, as issued for sub-resources.
    pub fn get(target: &'a TargetUrl, class: ResourceClass) -> Self {
        Self {
            target,
            method: Method::GET,
            body: None,
            content_type: None,
            class,
        }
    }
}

/// Client-side caching directive attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Rendered documents: always revalidate.
    NoCache,
    /// API responses, failures and stubs of failures.
    NoStore,
    /// Sub-resources: reusable for the given number of seconds.
    MaxAge(u64),
}

impl CachePolicy {
    pub fn header_value(&self) -> String {
        match self {
            CachePolicy::NoCache => "no-cache, no-store, must-revalidate".to_string(),
            CachePolicy::NoStore => "no-store".to_string(),
            CachePolicy::MaxAge(secs) => format!("public, max-age={}", secs),
        }
    }
}

/// Result of a direct fetch, ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
    pub cache: CachePolicy,
    /// Set when the body is a substitute rather than the upstream payload.
    pub stub: Option<StubReason>,
}
