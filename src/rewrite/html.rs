//! Streaming document rewriter.
//!
//! Attribute values are rewritten by tag and attribute identity; everything
//! else passes through byte for byte.

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, HtmlRewriter, Settings};
use std::cell::Cell;
use std::string::FromUtf8Error;
use thiserror::Error;
use url::Url;

use crate::rewrite::context::{decode_entities, RewriteContext};
use crate::rewrite::shim::{shim_element, SHIM_MARKER};

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("html rewriting failed: {0}")]
    Rewriting(#[from] RewritingError),

    #[error("rewritten document is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
}

/// Rewrite a serialized document so its resources load through the proxy.
///
/// In order: drop CSP meta directives, rewrite `script[src]`, `link[href]`
/// and `img[src]`, add a `<base>` for the document when it has none, and
/// insert the shim before `</head>`.
pub fn rewrite_document(html: &str, ctx: &RewriteContext) -> Result<String, RewriteError> {
    let declared_base = find_base_href(html)?;
    let base = declared_base
        .as_deref()
        .and_then(|href| ctx.document().resolve(&decode_entities(href)))
        .unwrap_or_else(|| ctx.document().url().clone());

    let base_element = if declared_base.is_none() {
        format!(r#"<base href="{}">"#, escape_attribute(ctx.document().as_str()))
    } else {
        String::new()
    };
    let shim = shim_element(ctx);

    let head_seen = Cell::new(false);
    let rewritten = Cell::new(0usize);
    let mut output = Vec::with_capacity(html.len() + shim.len() + 256);

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!("meta[http-equiv]", |el| {
                    if el.get_attribute("http-equiv").is_some_and(|v| is_csp_directive(&v)) {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("script[src]", |el| {
                    rewrite_attribute(el, "src", ctx, &base, &rewritten)?;
                    Ok(())
                }),
                element!("link[href]", |el| {
                    rewrite_attribute(el, "href", ctx, &base, &rewritten)?;
                    Ok(())
                }),
                element!("img[src]", |el| {
                    rewrite_attribute(el, "src", ctx, &base, &rewritten)?;
                    Ok(())
                }),
                element!("head", |el| {
                    if !head_seen.replace(true) {
                        if !base_element.is_empty() {
                            el.prepend(&base_element, ContentType::Html);
                        }
                        el.append(&shim, ContentType::Html);
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
        |chunk: &[u8]| output.extend_from_slice(chunk),
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    let mut document = String::from_utf8(output)?;

    // No <head> (or one without an end tag): inject at the document start,
    // where the parser still places it in the implied head.
    if !document.contains(SHIM_MARKER) {
        let injection = if head_seen.get() {
            shim
        } else {
            format!("{}{}", base_element, shim)
        };
        insert_at_document_start(&mut document, &injection);
    }

    tracing::debug!(
        document = %ctx.document(),
        rewritten = rewritten.get(),
        base = %base,
        "Document rewritten"
    );
    Ok(document)
}

fn rewrite_attribute(
    el: &mut Element,
    attribute: &str,
    ctx: &RewriteContext,
    base: &Url,
    rewritten: &Cell<usize>,
) -> Result<(), lol_html::errors::AttributeNameError> {
    let Some(value) = el.get_attribute(attribute) else {
        return Ok(());
    };
    if let Some(proxied) = ctx.rewrite_reference(base, &value) {
        el.set_attribute(attribute, &proxied)?;
        rewritten.set(rewritten.get() + 1);
    }
    Ok(())
}

/// First `<base href>` in the document, raw.
fn find_base_href(html: &str) -> Result<Option<String>, RewriteError> {
    let found: Cell<Option<String>> = Cell::new(None);
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!("base[href]", |el| {
                let current = found.take();
                found.set(current.or_else(|| el.get_attribute("href")));
                Ok(())
            })],
            ..Settings::default()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html.as_bytes())?;
    rewriter.end()?;
    Ok(found.into_inner())
}

fn is_csp_directive(http_equiv: &str) -> bool {
    let value = http_equiv.trim();
    value.eq_ignore_ascii_case("content-security-policy")
        || value.eq_ignore_ascii_case("content-security-policy-report-only")
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Insert after a leading doctype, so the document stays in standards mode.
fn insert_at_document_start(document: &mut String, injection: &str) {
    let leading = document.len() - document.trim_start().len();
    let rest = &document[leading..];
    let at = if rest.len() >= 9 && rest.as_bytes()[..9].eq_ignore_ascii_case(b"<!doctype") {
        rest.find('>').map_or(leading, |end| leading + end + 1)
    } else {
        leading
    };
    document.insert_str(at, injection);
}
