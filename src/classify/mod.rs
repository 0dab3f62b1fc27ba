//! Resource classification.
//!
//! Decides from the URL alone whether a request needs the rendering engine
//! (a navigable document) or can be served with a plain HTTP fetch
//! (sub-resources and API calls). Classification is recomputed per request
//! and never cached.
//!
//! # Rules (first match wins)
//! ```text
//! 1. static asset extension                 → SubResource
//! 2. resource path pattern or tracking host → SubResource
//! 3. no extension + API-like path           → ApiCall
//! 4. anything else                          → Document
//! ```

pub mod rules;

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub use rules::ClassifierRules;

use crate::target::TargetUrl;

/// Rule set shared by the dispatcher, fetcher and request filter; swapped on
/// configuration reload.
pub type SharedRules = Arc<ArcSwap<ClassifierRules>>;

/// Wrap a rule set for sharing.
pub fn shared(rules: ClassifierRules) -> SharedRules {
    Arc::new(ArcSwap::from_pointee(rules))
}

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Needs a rendering engine, its markup gets rewritten.
    Document,
    /// Static or script-generated asset, fetched directly.
    SubResource,
    /// Probable XHR/fetch endpoint, forwarded with its method and body.
    ApiCall,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Document => "document",
            ResourceClass::SubResource => "subresource",
            ResourceClass::ApiCall => "api",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of payload the requester expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedContent {
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Data,
    Other,
}

impl ExpectedContent {
    /// Derive from the path extension, falling back to well-known script endpoints.
    pub fn of(target: &TargetUrl) -> Self {
        match target.extension().as_deref() {
            Some("js" | "mjs" | "cjs") => ExpectedContent::Script,
            Some("css") => ExpectedContent::Stylesheet,
            Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" | "bmp") => {
                ExpectedContent::Image
            }
            Some("woff" | "woff2" | "ttf" | "otf" | "eot") => ExpectedContent::Font,
            Some("mp4" | "webm" | "mp3" | "wav" | "ogg" | "m4a" | "m3u8") => ExpectedContent::Media,
            Some("json" | "xml" | "txt" | "csv" | "map" | "wasm" | "pdf") => ExpectedContent::Data,
            Some(_) => ExpectedContent::Other,
            None => {
                let path = target.path();
                if path.ends_with("/gtag/js") || path.ends_with("/gtm") || path.contains("/recaptcha/api") {
                    ExpectedContent::Script
                } else {
                    ExpectedContent::Other
                }
            }
        }
    }

    /// `Accept` header a browser would send for this payload.
    pub fn accept_header(&self) -> &'static str {
        match self {
            ExpectedContent::Script => "*/*",
            ExpectedContent::Stylesheet => "text/css,*/*;q=0.1",
            ExpectedContent::Image => "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
            ExpectedContent::Font => "font/woff2,font/woff,*/*;q=0.1",
            ExpectedContent::Media => "*/*",
            ExpectedContent::Data => "application/json,text/plain,*/*",
            ExpectedContent::Other => "*/*",
        }
    }
}

/// Classify a URL with the built-in rule set.
pub fn classify(target: &TargetUrl) -> ResourceClass {
    static DEFAULT_RULES: OnceLock<ClassifierRules> = OnceLock::new();
    classify_with(DEFAULT_RULES.get_or_init(ClassifierRules::default), target)
}

/// Classify a URL with an explicit rule set. Total and side-effect free.
pub fn classify_with(rules: &ClassifierRules, target: &TargetUrl) -> ResourceClass {
    let extension = target.extension();

    if let Some(ext) = extension.as_deref() {
        if rules.is_static_extension(ext) {
            return ResourceClass::SubResource;
        }
    }

    if rules.matches_resource_path(target) || rules.is_tracking_host(target.host()) {
        return ResourceClass::SubResource;
    }

    if extension.is_none() && rules.matches_api_path(target) {
        return ResourceClass::ApiCall;
    }

    ResourceClass::Document
}
