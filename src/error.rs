//! Request-level error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::render::RenderError;
use crate::rewrite::RewriteError;

/// Why every navigation strategy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationFailure {
    /// Every attempt ran out of time.
    Timeout,
    /// The host did not resolve or refused the connection.
    Unresolved,
    /// Anything else the engine reported.
    Other,
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NavigationFailure::Timeout => "timeout",
            NavigationFailure::Unresolved => "unresolved",
            NavigationFailure::Other => "other",
        })
    }
}

/// Errors surfaced to proxy clients.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("missing url parameter")]
    MissingUrl,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported mode '{0}'")]
    InvalidMode(String),

    #[error("rendering engine could not start: {0}")]
    SessionLaunchFailed(String),

    #[error("navigation failed ({kind}): {detail}")]
    NavigationFailed {
        kind: NavigationFailure,
        detail: String,
    },

    #[error("resource fetch failed: {0}")]
    ResourceFetchFailed(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("request body rejected: {0}")]
    Body(String),
}

impl ProxyError {
    /// HTTP status presented to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl
            | ProxyError::InvalidUrl(_)
            | ProxyError::InvalidMode(_)
            | ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::SessionLaunchFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::NavigationFailed { kind, .. } => match kind {
                NavigationFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                NavigationFailure::Unresolved | NavigationFailure::Other => StatusCode::BAD_GATEWAY,
            },
            ProxyError::ResourceFetchFailed(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Render(_) | ProxyError::Rewrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message; the raw error text travels separately as `detail`.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::MissingUrl => "Missing url parameter",
            ProxyError::InvalidUrl(_) => "Invalid URL format",
            ProxyError::InvalidMode(_) => "Unsupported mode, expected html, screenshot or pdf",
            ProxyError::SessionLaunchFailed(_) => "Rendering engine unavailable",
            ProxyError::NavigationFailed { kind, .. } => match kind {
                NavigationFailure::Timeout => "Page load timed out",
                NavigationFailure::Unresolved => "Could not resolve or connect to the target host",
                NavigationFailure::Other => "Failed to load page",
            },
            ProxyError::ResourceFetchFailed(_) => "Upstream resource unavailable",
            ProxyError::Render(_) => "Failed to capture rendered page",
            ProxyError::Rewrite(_) => "Failed to rewrite document",
            ProxyError::Body(_) => "Request body rejected",
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MissingUrl => "missing_url",
            ProxyError::InvalidUrl(_) => "invalid_url",
            ProxyError::InvalidMode(_) => "invalid_mode",
            ProxyError::SessionLaunchFailed(_) => "session_launch_failed",
            ProxyError::NavigationFailed { .. } => "navigation_failed",
            ProxyError::ResourceFetchFailed(_) => "resource_fetch_failed",
            ProxyError::Render(_) => "render",
            ProxyError::Rewrite(_) => "rewrite",
            ProxyError::Body(_) => "body",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    kind: &'static str,
    detail: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
            kind: self.kind(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
