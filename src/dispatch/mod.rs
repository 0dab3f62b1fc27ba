//! Request dispatcher.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (target, method, body, mode, proxy origin)
//!     → classify (Document | SubResource | ApiCall)
//!     → SubResource: DirectFetcher GET
//!     → ApiCall:     DirectFetcher with the client's method and body
//!     → Document:    session → page lease → navigator → rewriter
//!     → ProxyResponse
//! ```

use axum::http::{Method, StatusCode};
use bytes::Bytes;
use std::sync::Arc;

use crate::classify::{classify_with, ResourceClass, SharedRules};
use crate::error::ProxyError;
use crate::fetch::{CachePolicy, DirectFetcher, FetchRequest, FetchedResource, StubReason};
use crate::render::{
    Navigator, PageContent, PageLease, RenderError, RenderMode, RenderSessionManager, RequestFilter,
    RequestInterceptor,
};
use crate::rewrite::{rewrite_document, RewriteContext};
use crate::target::TargetUrl;

/// One inbound `/proxy` request, already validated.
#[derive(Debug)]
pub struct ProxyRequest {
    pub target: TargetUrl,
    pub method: Method,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
    pub mode: RenderMode,
    /// `scheme://host[:port]` the client reached this server at.
    pub proxy_origin: String,
}

/// Payload plus the metadata the HTTP layer turns into headers.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
    pub cache: CachePolicy,
    pub target: TargetUrl,
    pub class: ResourceClass,
    pub stub: Option<StubReason>,
}

impl ProxyResponse {
    fn fetched(fetched: FetchedResource, target: TargetUrl, class: ResourceClass) -> Self {
        Self {
            status: fetched.status,
            content_type: fetched.content_type,
            body: fetched.body,
            cache: fetched.cache,
            target,
            class,
            stub: fetched.stub,
        }
    }
}

/// Routes each request to the fetch strategy its class needs.
#[derive(Clone)]
pub struct Dispatcher {
    rules: SharedRules,
    fetcher: DirectFetcher,
    sessions: RenderSessionManager,
    navigator: Arc<Navigator>,
    interceptor: Arc<dyn RequestInterceptor>,
}

impl Dispatcher {
    pub fn new(
        rules: SharedRules,
        fetcher: DirectFetcher,
        sessions: RenderSessionManager,
        navigator: Navigator,
    ) -> Self {
        let interceptor: Arc<dyn RequestInterceptor> = Arc::new(RequestFilter::new(rules.clone()));
        Self {
            rules,
            fetcher,
            sessions,
            navigator: Arc::new(navigator),
            interceptor,
        }
    }

    pub fn sessions(&self) -> &RenderSessionManager {
        &self.sessions
    }

    /// Classify with the current (possibly reloaded) rule set.
    pub fn classify(&self, target: &TargetUrl) -> ResourceClass {
        classify_with(&self.rules.load(), target)
    }

    pub async fn dispatch(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let class = self.classify(&request.target);
        tracing::debug!(
            target_url = %request.target,
            class = %class,
            method = %request.method,
            mode = %request.mode,
            "Dispatching"
        );

        match class {
            ResourceClass::Document => self.render(request).await,
            ResourceClass::SubResource => {
                let fetched = self
                    .fetcher
                    .fetch(FetchRequest::get(&request.target, class))
                    .await?;
                Ok(ProxyResponse::fetched(fetched, request.target, class))
            }
            ResourceClass::ApiCall => {
                let fetched = self
                    .fetcher
                    .fetch(FetchRequest {
                        target: &request.target,
                        method: request.method.clone(),
                        body: request.body.clone(),
                        content_type: request.content_type.clone(),
                        class,
                    })
                    .await?;
                Ok(ProxyResponse::fetched(fetched, request.target, class))
            }
        }
    }

    /// Direct passthrough, whatever the URL classifies as.
    pub async fn fetch_resource(&self, target: TargetUrl) -> Result<ProxyResponse, ProxyError> {
        let fetched = self
            .fetcher
            .fetch(FetchRequest::get(&target, ResourceClass::SubResource))
            .await?;
        Ok(ProxyResponse::fetched(fetched, target, ResourceClass::SubResource))
    }

    async fn render(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let session = self.sessions.acquire().await?;

        let lease = match PageLease::open(&session, self.interceptor.clone()).await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::error!(error = %e, generation = session.generation(), "Page creation failed");
                self.sessions.invalidate(&session).await;
                return Err(e.into());
            }
        };

        let outcome = match lease.page() {
            Ok(page) => self.navigator.navigate(page, &request.target, request.mode).await,
            Err(e) => Err(e),
        };
        lease.release().await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                if matches!(e, RenderError::Disconnected) {
                    self.sessions.invalidate(&session).await;
                }
                return Err(e.into());
            }
        };

        let (content_type, body) = match outcome.into_result()? {
            PageContent::Html(html) => {
                let ctx = RewriteContext::new(&request.proxy_origin, request.target.clone());
                let rewritten = rewrite_document(&html, &ctx)?;
                ("text/html; charset=utf-8", Bytes::from(rewritten))
            }
            PageContent::Image(png) => ("image/png", Bytes::from(png)),
            PageContent::Pdf(pdf) => ("application/pdf", Bytes::from(pdf)),
        };

        Ok(ProxyResponse {
            status: StatusCode::OK,
            content_type: content_type.to_string(),
            body,
            cache: CachePolicy::NoCache,
            target: request.target,
            class: ResourceClass::Document,
            stub: None,
        })
    }
}
