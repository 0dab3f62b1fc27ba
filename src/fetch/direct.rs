//! Plain HTTP retrieval of sub-resources and API calls.

use bytes::Bytes;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use reqwest::{Method, StatusCode};
use std::time::Duration;

use crate::classify::{ClassifierRules, ExpectedContent, ResourceClass, SharedRules};
use crate::config::FetcherConfig;
use crate::error::ProxyError;
use crate::fetch::stub::{looks_like_html, stub_content_type, StubReason};
use crate::fetch::{CachePolicy, FetchRequest, FetchedResource};
use crate::observability::metrics;

/// Fetches non-document URLs without the rendering engine.
#[derive(Clone)]
pub struct DirectFetcher {
    client: reqwest::Client,
    rules: SharedRules,
    cache_max_age_secs: u64,
    accept_language: String,
}

impl DirectFetcher {
    pub fn new(config: &FetcherConfig, rules: SharedRules) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            rules,
            cache_max_age_secs: config.cache_max_age_secs,
            accept_language: config.accept_language.clone(),
        })
    }

    /// Fetch a URL, degrading to stubs where a convention exists.
    pub async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchedResource, ProxyError> {
        let expected = ExpectedContent::of(request.target);

        if let Some(suppressed) = self.suppress_tracking(&self.rules.load(), &request, expected) {
            tracing::debug!(target_url = %request.target, "Suppressed tracking request");
            metrics::record_stub(StubReason::Tracking);
            return Ok(suppressed);
        }

        let response = match self.send(&request, expected).await {
            Ok(response) => response,
            Err(e) => return self.recover(&request, expected, StubReason::UpstreamError, e.to_string()),
        };

        let status = response.status();
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            if let Some(stub) = self.stub(expected, StubReason::UpstreamStatus) {
                tracing::info!(
                    target_url = %request.target,
                    status = %status,
                    "Upstream failure replaced with empty stub"
                );
                return Ok(stub);
            }
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => return self.recover(&request, expected, StubReason::UpstreamError, e.to_string()),
        };

        if stub_content_type(expected).is_some() && looks_like_html(declared.as_deref(), &body) {
            tracing::warn!(
                target_url = %request.target,
                declared = declared.as_deref().unwrap_or("none"),
                "HTML returned where a script or stylesheet was expected"
            );
            if let Some(stub) = self.stub(expected, StubReason::HtmlChallenge) {
                return Ok(stub);
            }
        }

        let content_type = declared.unwrap_or_else(|| {
            mime_guess::from_path(request.target.path())
                .first_or_octet_stream()
                .to_string()
        });

        let cache = if !status.is_success() || request.class == ResourceClass::ApiCall {
            CachePolicy::NoStore
        } else {
            CachePolicy::MaxAge(self.cache_max_age_secs)
        };

        Ok(FetchedResource {
            status,
            content_type,
            body,
            cache,
            stub: None,
        })
    }

    async fn send(
        &self,
        request: &FetchRequest<'_>,
        expected: ExpectedContent,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let accept = if request.class == ResourceClass::ApiCall {
            "application/json, text/plain, */*"
        } else {
            expected.accept_header()
        };

        let mut builder = self
            .client
            .request(request.method.clone(), request.target.url().clone())
            .header(ACCEPT, accept)
            .header(ACCEPT_LANGUAGE, &self.accept_language)
            .header(REFERER, format!("{}/", request.target.origin()))
            .header(
                "sec-fetch-mode",
                if request.class == ResourceClass::ApiCall { "cors" } else { "no-cors" },
            );

        if request.method != Method::GET && request.method != Method::HEAD {
            if let Some(content_type) = &request.content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
        }

        builder.send().await
    }

    fn suppress_tracking(
        &self,
        rules: &ClassifierRules,
        request: &FetchRequest<'_>,
        expected: ExpectedContent,
    ) -> Option<FetchedResource> {
        let target = request.target;
        let tracking_host = rules.is_tracking_host(target.host());
        let tracking_url = rules.matches_tracking_url(target)
            && matches!(expected, ExpectedContent::Image | ExpectedContent::Other);

        if !tracking_host && !tracking_url {
            return None;
        }

        // Scripts and styles from trackers still need a parseable body.
        if let Some(content_type) = stub_content_type(expected) {
            return Some(FetchedResource {
                status: StatusCode::OK,
                content_type: content_type.to_string(),
                body: Bytes::new(),
                cache: CachePolicy::MaxAge(self.cache_max_age_secs),
                stub: Some(StubReason::Tracking),
            });
        }

        Some(FetchedResource {
            status: StatusCode::NO_CONTENT,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: Bytes::new(),
            cache: CachePolicy::MaxAge(self.cache_max_age_secs),
            stub: Some(StubReason::Tracking),
        })
    }

    fn stub(&self, expected: ExpectedContent, reason: StubReason) -> Option<FetchedResource> {
        let content_type = stub_content_type(expected)?;
        metrics::record_stub(reason);
        Some(FetchedResource {
            status: StatusCode::OK,
            content_type: content_type.to_string(),
            body: Bytes::new(),
            cache: CachePolicy::NoStore,
            stub: Some(reason),
        })
    }

    fn recover(
        &self,
        request: &FetchRequest<'_>,
        expected: ExpectedContent,
        reason: StubReason,
        error: String,
    ) -> Result<FetchedResource, ProxyError> {
        tracing::warn!(target_url = %request.target, error = %error, "Upstream fetch failed");
        self.stub(expected, reason)
            .ok_or_else(|| ProxyError::ResourceFetchFailed(format!("{}: {}", request.target, error)))
    }
}
