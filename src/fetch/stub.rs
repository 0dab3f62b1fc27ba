//! Substitute payloads served instead of a broken or unwanted upstream response.

use crate::classify::ExpectedContent;

/// Why a stub replaced the upstream payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubReason {
    /// Upstream answered with a non-success status.
    UpstreamStatus,
    /// Upstream could not be reached.
    UpstreamError,
    /// Upstream answered with an HTML page where a script or stylesheet was expected.
    HtmlChallenge,
    /// The URL is a known tracker.
    Tracking,
}

impl StubReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StubReason::UpstreamStatus => "upstream_status",
            StubReason::UpstreamError => "upstream_error",
            StubReason::HtmlChallenge => "html_challenge",
            StubReason::Tracking => "tracking",
        }
    }
}

/// Content type of the empty stand-in for `expected`, if one exists.
///
/// Only scripts and stylesheets have a stub convention: an empty body of the
/// right type keeps the page's parser happy, anything else is better reported.
pub fn stub_content_type(expected: ExpectedContent) -> Option<&'static str> {
    match expected {
        ExpectedContent::Script => Some("application/javascript; charset=utf-8"),
        ExpectedContent::Stylesheet => Some("text/css; charset=utf-8"),
        _ => None,
    }
}

/// Heuristic check for an HTML document in a body that should not be one.
pub fn looks_like_html(content_type: Option<&str>, body: &[u8]) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.starts_with("text/html") || ct.starts_with("application/xhtml") {
            return true;
        }
    }

    let head = &body[..body.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();
    text.starts_with("<!doctype html") || text.starts_with("<html") || text.starts_with("<head")
}
