//! Client-side shim that keeps runtime traffic inside the proxy origin.
//!
//! The script overrides `fetch`, `XMLHttpRequest.prototype.open` and link
//! clicks, routing each URL through `makeProxyUrl`: resolve against the
//! document's own URL, then encode as the proxy's `url` parameter. Already
//! proxied URLs are used as they are.
//!
//! The script itself is only checked structurally here; what the tests pin
//! down is that the prefixes it is configured with agree with the
//! server-side rewriter.

use serde::Serialize;

use crate::rewrite::context::{RewriteContext, PROXY_PATH};

const SHIM_TEMPLATE: &str = include_str!("shim.js");
const CONFIG_PLACEHOLDER: &str = "__RENDER_PROXY_CONFIG__";

/// Attribute marking the injected element.
pub const SHIM_MARKER: &str = "data-render-proxy-shim";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShimConfig<'a> {
    proxy_base: &'a str,
    proxy_path: &'a str,
    document_url: &'a str,
}

/// Script body parameterized for `ctx`.
pub fn shim_script(ctx: &RewriteContext) -> String {
    let config = ShimConfig {
        proxy_base: ctx.proxy_prefix(),
        proxy_path: PROXY_PATH,
        document_url: ctx.document().as_str(),
    };
    // serde_json output is a valid JS literal; only a closing tag could end
    // the surrounding element early.
    let literal = serde_json::to_string(&config)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");

    SHIM_TEMPLATE.replace(CONFIG_PLACEHOLDER, &literal)
}

/// The full `<script>` element inserted into documents.
pub fn shim_element(ctx: &RewriteContext) -> String {
    format!("<script {}>\n{}</script>", SHIM_MARKER, shim_script(ctx))
}
