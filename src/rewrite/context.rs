//! Per-document rewrite parameters.

use url::Url;

use crate::target::TargetUrl;

/// Path and query prefix every proxied reference starts with.
pub const PROXY_PATH: &str = "/proxy?url=";

/// Schemes that never leave the document and are left alone.
const PASSTHROUGH_SCHEMES: &[&str] = &["data:", "blob:", "javascript:", "about:", "mailto:", "tel:"];

/// Built once per rendered document, dropped after the response is sent.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    proxy_origin: String,
    proxy_prefix: String,
    document: TargetUrl,
}

impl RewriteContext {
    /// `proxy_origin` is `scheme://host[:port]` of this server; a trailing
    /// slash is ignored.
    pub fn new(proxy_origin: &str, document: TargetUrl) -> Self {
        let proxy_origin = proxy_origin.trim_end_matches('/').to_string();
        let proxy_prefix = format!("{}{}", proxy_origin, PROXY_PATH);
        Self {
            proxy_origin,
            proxy_prefix,
            document,
        }
    }

    pub fn proxy_origin(&self) -> &str {
        &self.proxy_origin
    }

    /// `<origin>/proxy?url=`
    pub fn proxy_prefix(&self) -> &str {
        &self.proxy_prefix
    }

    pub fn document(&self) -> &TargetUrl {
        &self.document
    }

    /// Proxy URL for an absolute target.
    pub fn proxy_url(&self, absolute: &Url) -> String {
        format!("{}{}", self.proxy_prefix, urlencoding::encode(absolute.as_str()))
    }

    /// Whether `value` already points back through this proxy.
    pub fn is_proxied(&self, value: &str) -> bool {
        value.starts_with(&self.proxy_prefix) || value.starts_with(PROXY_PATH)
    }

    /// Rewrite a raw attribute value found in the document.
    ///
    /// `base` is the URL relative references resolve against (the
    /// document's own URL unless it declares a `<base>`). Returns `None` when
    /// the value must stay as it is.
    pub fn rewrite_reference(&self, base: &Url, raw: &str) -> Option<String> {
        let value = decode_entities(raw.trim());
        if value.is_empty() || value.starts_with('#') || self.is_proxied(&value) {
            return None;
        }

        let lower = value.to_ascii_lowercase();
        if PASSTHROUGH_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return None;
        }

        let absolute = base.join(&value).ok()?;
        if !matches!(absolute.scheme(), "http" | "https") {
            return None;
        }
        Some(self.proxy_url(&absolute))
    }
}

/// Decode the character references that show up in URL attributes.
pub fn decode_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    const ENTITIES: &[(&str, &str)] = &[
        ("&amp;", "&"),
        ("&#38;", "&"),
        ("&#x26;", "&"),
        ("&quot;", "\""),
        ("&#34;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&lt;", "<"),
        ("&gt;", ">"),
    ];

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    'outer: while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        for (entity, replacement) in ENTITIES {
            let bytes = tail.as_bytes();
            if bytes.len() >= entity.len() && bytes[..entity.len()].eq_ignore_ascii_case(entity.as_bytes()) {
                out.push_str(replacement);
                rest = &tail[entity.len()..];
                continue 'outer;
            }
        }
        out.push('&');
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RewriteContext {
        RewriteContext::new(
            "http://localhost:3000/",
            TargetUrl::parse("https://example.com/blog/post").unwrap(),
        )
    }

    #[test]
    fn prefix_is_built_from_origin() {
        let ctx = context();
        assert_eq!(ctx.proxy_origin(), "http://localhost:3000");
        assert_eq!(ctx.proxy_prefix(), "http://localhost:3000/proxy?url=");
    }

    #[test]
    fn resolves_relative_references_against_base() {
        let ctx = context();
        let base = ctx.document().url().clone();

        assert_eq!(
            ctx.rewrite_reference(&base, "/app.js").unwrap(),
            "http://localhost:3000/proxy?url=https%3A%2F%2Fexample.com%2Fapp.js"
        );
        assert_eq!(
            ctx.rewrite_reference(&base, "img/a.png").unwrap(),
            "http://localhost:3000/proxy?url=https%3A%2F%2Fexample.com%2Fblog%2Fimg%2Fa.png"
        );
        assert_eq!(
            ctx.rewrite_reference(&base, "//cdn.example.net/x.css").unwrap(),
            "http://localhost:3000/proxy?url=https%3A%2F%2Fcdn.example.net%2Fx.css"
        );
    }

    #[test]
    fn leaves_inline_and_proxied_values_alone() {
        let ctx = context();
        let base = ctx.document().url().clone();
        for value in [
            "",
            "#top",
            "data:image/png;base64,AAAA",
            "blob:https://example.com/1",
            "javascript:void(0)",
            "about:blank",
            "http://localhost:3000/proxy?url=https%3A%2F%2Fexample.com%2F",
            "/proxy?url=https%3A%2F%2Fexample.com%2F",
        ] {
            assert_eq!(ctx.rewrite_reference(&base, value), None, "{value}");
        }
    }

    #[test]
    fn decodes_ampersands_before_resolving() {
        let ctx = context();
        let base = ctx.document().url().clone();
        let rewritten = ctx.rewrite_reference(&base, "/s.js?a=1&amp;b=2").unwrap();
        assert!(rewritten.ends_with("%2Fs.js%3Fa%3D1%26b%3D2"));
        assert_eq!(decode_entities("a &AMP; b &unknown; c"), "a & b &unknown; c");
    }
}
