//! Target URL normalization.
//!
//! Every URL the proxy acts on passes through [`TargetUrl::parse`] first, so
//! downstream code can rely on an absolute http(s) URL with a host.

use std::fmt;
use url::Url;

use crate::error::ProxyError;

/// An absolute, canonicalized http(s) URL the proxy fetches on behalf of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    url: Url,
}

impl TargetUrl {
    /// Parse a raw query parameter into a canonical absolute URL.
    ///
    /// Repeated path separators are collapsed; the scheme separator is untouched.
    pub fn parse(raw: &str) -> Result<Self, ProxyError> {
        let trimmed = raw.trim();
        let mut url =
            Url::parse(trimmed).map_err(|e| ProxyError::InvalidUrl(format!("{trimmed}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidUrl(format!(
                "{trimmed}: unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ProxyError::InvalidUrl(format!("{trimmed}: missing host")));
        }

        let collapsed = collapse_separators(url.path());
        if collapsed != url.path() {
            url.set_path(&collapsed);
        }

        Ok(Self { url })
    }

    /// Wrap an already-absolute URL (e.g. one produced by [`TargetUrl::resolve`]).
    pub fn from_url(url: Url) -> Result<Self, ProxyError> {
        Self::parse(url.as_str())
    }

    /// Resolve a reference found inside this document against it.
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        self.url.join(reference).ok()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// `scheme://host[:port]` of the target.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Lowercased extension of the last path segment, if it has one.
    pub fn extension(&self) -> Option<String> {
        let segment = self.url.path().rsplit('/').next()?;
        let (stem, ext) = segment.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
            return None;
        }
        if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

fn collapse_separators(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}
