//! Request filter applied while a page renders.
//!
//! Only hosts on the navigation denylist are aborted. Blocking whole
//! categories (fonts, third-party hosts) breaks too many real sites.

use url::Url;

use crate::classify::SharedRules;
use crate::observability::metrics;
use crate::render::engine::{InterceptDecision, InterceptedRequest, RequestInterceptor};

pub struct RequestFilter {
    rules: SharedRules,
}

impl RequestFilter {
    pub fn new(rules: SharedRules) -> Self {
        Self { rules }
    }
}

impl RequestInterceptor for RequestFilter {
    fn decide(&self, request: &InterceptedRequest<'_>) -> InterceptDecision {
        let Ok(url) = Url::parse(request.url) else {
            return InterceptDecision::Continue;
        };
        let Some(host) = url.host_str() else {
            return InterceptDecision::Continue;
        };

        if self.rules.load().is_navigation_denied(host) {
            tracing::trace!(url = request.url, resource_type = request.resource_type, "Blocked page request");
            metrics::record_blocked_request();
            InterceptDecision::Block
        } else {
            InterceptDecision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{shared, ClassifierRules};

    fn decide(filter: &RequestFilter, url: &str) -> InterceptDecision {
        filter.decide(&InterceptedRequest {
            url,
            resource_type: "Script",
        })
    }

    #[test]
    fn blocks_only_denylisted_hosts() {
        let filter = RequestFilter::new(shared(ClassifierRules::default()));

        assert_eq!(
            decide(&filter, "https://www.google-analytics.com/analytics.js"),
            InterceptDecision::Block
        );
        assert_eq!(
            decide(&filter, "https://securepubads.g.doubleclick.net/tag/js/gpt.js"),
            InterceptDecision::Block
        );
        assert_eq!(
            decide(&filter, "https://fonts.gstatic.com/s/inter/v12/a.woff2"),
            InterceptDecision::Continue
        );
        assert_eq!(decide(&filter, "https://example.com/app.js"), InterceptDecision::Continue);
        assert_eq!(decide(&filter, "data:image/png;base64,AAAA"), InterceptDecision::Continue);
    }
}
