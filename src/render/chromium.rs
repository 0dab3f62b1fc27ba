//! Chromium engine over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, RequestId,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, EventDomContentEventFired, EventLoadEventFired, NavigateParams, PrintToPdfParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use url::Url;

use crate::render::engine::{
    InterceptDecision, InterceptedRequest, LaunchOptions, NavigationError, NetworkErrorKind, RenderBrowser,
    RenderEngine, RenderError, RenderPage, RequestInterceptor, WaitCondition,
};

/// Protocol command timeout; navigation steps carry their own, shorter ones.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumEngine;

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn RenderBrowser>, RenderError> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&options.executable)
            .request_timeout(REQUEST_TIMEOUT)
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .args(options.args.clone());
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "Engine event error");
                }
            }
            flag.store(false, Ordering::SeqCst);
            tracing::warn!("Engine connection closed");
        });

        Ok(Arc::new(ChromiumBrowser {
            browser: tokio::sync::Mutex::new(browser),
            connected,
            user_agent: options.user_agent.clone(),
        }))
    }
}

pub struct ChromiumBrowser {
    browser: tokio::sync::Mutex<Browser>,
    connected: Arc<AtomicBool>,
    user_agent: String,
}

#[async_trait]
impl RenderBrowser for ChromiumBrowser {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_page(
        &self,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Result<Box<dyn RenderPage>, RenderError> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(page_error)?;

        // Always close the page if setup fails half way.
        match ChromiumPage::prepare(page.clone(), &self.user_agent, interceptor).await {
            Ok(prepared) => Ok(Box::new(prepared)),
            Err(e) => {
                if let Err(close) = page.close().await {
                    tracing::warn!(error = %close, "Page close after failed setup failed");
                }
                Err(e)
            }
        }
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            tracing::warn!(error = %e, "Engine close failed, killing process");
            if let Some(Err(e)) = browser.kill().await {
                tracing::warn!(error = %e, "Engine process kill failed");
            }
            return;
        }
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "Engine process wait failed");
        }
    }
}

type InFlight = Arc<Mutex<HashSet<RequestId>>>;

pub struct ChromiumPage {
    page: Page,
    in_flight: InFlight,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumPage {
    async fn prepare(
        page: Page,
        user_agent: &str,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Result<Self, RenderError> {
        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(page_error)?;

        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));
        let mut listeners = Vec::new();

        // Subscribe before enabling the domains so no event is missed.
        let mut sent = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(page_error)?;
        let mut finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(page_error)?;
        let mut failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(page_error)?;
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(page_error)?;

        let tracker = in_flight.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = sent.next().await {
                lock(&tracker).insert(event.request_id.clone());
            }
        }));
        let tracker = in_flight.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = finished.next().await {
                lock(&tracker).remove(&event.request_id);
            }
        }));
        let tracker = in_flight.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = failed.next().await {
                lock(&tracker).remove(&event.request_id);
            }
        }));

        let intercepting = page.clone();
        listeners.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let decision = interceptor.decide(&InterceptedRequest {
                    url: &event.request.url,
                    resource_type: event.resource_type.as_ref(),
                });
                let result = match decision {
                    InterceptDecision::Continue => intercepting
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                    InterceptDecision::Block => intercepting
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ()),
                };
                if let Err(e) = result {
                    tracing::debug!(url = %event.request.url, error = %e, "Intercepted request not resolved");
                }
            }
        }));

        let prepared = Self {
            page,
            in_flight,
            listeners,
        };

        prepared
            .page
            .execute(network::EnableParams::default())
            .await
            .map_err(page_error)?;
        prepared
            .page
            .execute(fetch::EnableParams {
                patterns: Some(vec![RequestPattern {
                    url_pattern: Some("*".to_string()),
                    resource_type: None,
                    request_stage: Some(RequestStage::Request),
                }]),
                handle_auth_requests: Some(false),
            })
            .await
            .map_err(page_error)?;

        Ok(prepared)
    }

    /// Chromium swaps failed navigations for its own error document, which
    /// fires the same lifecycle events as a real page.
    async fn on_error_page(&self) -> Result<bool, NavigationError> {
        let href = self
            .page
            .evaluate("location.href".to_string())
            .await
            .map_err(navigation_error)?;
        Ok(href.into_value::<String>().unwrap_or_default().starts_with("chrome-error://"))
    }

    async fn wait_for_network_idle(&self, max_in_flight: usize, window: Duration) -> Result<(), NavigationError> {
        let mut idle_since: Option<Instant> = None;
        loop {
            let open = lock(&self.in_flight).len();
            if open <= max_in_flight {
                let since = *idle_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= window {
                    return Ok(());
                }
            } else {
                idle_since = None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl RenderPage for ChromiumPage {
    async fn navigate(&self, url: &Url, condition: WaitCondition) -> Result<(), NavigationError> {
        lock(&self.in_flight).clear();

        let params = NavigateParams::builder()
            .url(url.as_str())
            .build()
            .map_err(|e| NavigationError::Engine(RenderError::Page(e)))?;

        let mut dom_ready = self
            .page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(navigation_error)?;
        let mut loaded = self
            .page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(navigation_error)?;

        // The navigate command only answers after `load`, so it runs on its
        // own task while the lifecycle events decide the looser conditions.
        let page = self.page.clone();
        let mut navigation = AbortOnDrop(tokio::spawn(async move {
            page.execute(params).await.map(|response| response.result.error_text)
        }));

        let fired = async {
            match condition {
                WaitCondition::Load => loaded.next().await.map(|_| ()),
                WaitCondition::DomContentLoaded | WaitCondition::NetworkIdle { .. } => {
                    dom_ready.next().await.map(|_| ())
                }
            }
        };

        let answered = async { navigation_result(url, (&mut navigation.0).await) };
        let progress = first_progress(answered, fired).await;
        match progress {
            Progress::Answered(result) => result?,
            Progress::Closed => return Err(NavigationError::Engine(RenderError::Disconnected)),
            Progress::Fired => {
                if self.on_error_page().await? {
                    navigation_result(url, (&mut navigation.0).await)?;
                    return Err(NavigationError::Engine(RenderError::Page(format!(
                        "navigation to {} ended on an error page",
                        url
                    ))));
                }
            }
        }

        match condition {
            WaitCondition::DomContentLoaded | WaitCondition::Load => Ok(()),
            WaitCondition::NetworkIdle { max_in_flight, idle_window } => {
                self.wait_for_network_idle(max_in_flight, idle_window).await
            }
        }
    }

    async fn evaluate(&self, script: &str) -> Result<(), RenderError> {
        self.page
            .evaluate(script.to_string())
            .await
            .map(|_| ())
            .map_err(page_error)
    }

    async fn content(&self) -> Result<String, RenderError> {
        self.page.content().await.map_err(|e| RenderError::Capture(e.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, RenderError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page
            .screenshot(params)
            .await
            .map_err(|e| RenderError::Capture(e.to_string()))
    }

    async fn pdf(&self) -> Result<Vec<u8>, RenderError> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            ..PrintToPdfParams::default()
        };
        self.page.pdf(params).await.map_err(|e| RenderError::Capture(e.to_string()))
    }

    async fn close(self: Box<Self>) {
        let this = *self;
        for listener in &this.listeners {
            listener.abort();
        }
        if let Err(e) = this.page.close().await {
            tracing::debug!(error = %e, "Page close failed");
        }
    }
}

fn lock(set: &Mutex<HashSet<RequestId>>) -> std::sync::MutexGuard<'_, HashSet<RequestId>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a navigation showed first.
#[derive(Debug)]
enum Progress {
    /// The navigate command answered, which implies `load`.
    Answered(Result<(), NavigationError>),
    /// The awaited lifecycle event fired.
    Fired,
    /// The event stream ended with the connection.
    Closed,
}

async fn first_progress<N, F>(answered: N, fired: F) -> Progress
where
    N: Future<Output = Result<(), NavigationError>>,
    F: Future<Output = Option<()>>,
{
    tokio::select! {
        result = answered => Progress::Answered(result),
        fired = fired => match fired {
            Some(()) => Progress::Fired,
            None => Progress::Closed,
        },
    }
}

/// Aborts the wrapped task when dropped, e.g. when a step times out.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn navigation_result(
    url: &Url,
    joined: Result<Result<Option<String>, CdpError>, JoinError>,
) -> Result<(), NavigationError> {
    match joined {
        Ok(Ok(None)) => Ok(()),
        Ok(Ok(Some(text))) => Err(NavigationError::Network {
            kind: NetworkErrorKind::from_error_text(&text),
            detail: format!("{} at {}", text, url),
        }),
        Ok(Err(e)) => Err(navigation_error(e)),
        Err(e) => Err(NavigationError::Engine(RenderError::Page(e.to_string()))),
    }
}

fn page_error(e: CdpError) -> RenderError {
    match e {
        CdpError::ChannelSendError(_) | CdpError::NoResponse => RenderError::Disconnected,
        other => RenderError::Page(other.to_string()),
    }
}

fn navigation_error(e: CdpError) -> NavigationError {
    match e {
        CdpError::Timeout => NavigationError::Timeout(e.to_string()),
        other => {
            let text = other.to_string();
            if text.contains("net::ERR_") {
                NavigationError::Network {
                    kind: NetworkErrorKind::from_error_text(&text),
                    detail: text,
                }
            } else {
                NavigationError::Engine(page_error(other))
            }
        }
    }
}
