//! Navigation strategy.
//!
//! A page load is attempted against an ordered list of completion
//! conditions, strictest first. Each step gets its own timeout and the
//! first step that commits ends the chain. Sites with endless background
//! traffic (polling, ads, sockets) never reach network idle but are
//! perfectly usable once `load` or `DOMContentLoaded` fired.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::NavigationConfig;
use crate::error::{NavigationFailure, ProxyError};
use crate::observability::metrics;
use crate::render::engine::{NavigationError, NetworkErrorKind, RenderError, RenderPage, WaitCondition};
use crate::target::TargetUrl;

/// Scrolls to the bottom in viewport steps and back, to wake lazy loaders.
const SCROLL_SCRIPT: &str = r#"
(async () => {
    const step = Math.max(window.innerHeight || 0, 400);
    for (let i = 0, y = 0; i < 40 && y < document.documentElement.scrollHeight; i++, y += step) {
        window.scrollTo(0, y);
        await new Promise((resolve) => setTimeout(resolve, 100));
    }
    window.scrollTo(0, 0);
})()
"#;

/// Longest the scroll pass can run: 40 steps, 100 ms apart.
pub const SCROLL_PASS_MAX: Duration = Duration::from_secs(4);

/// What a document request returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Rewritten markup.
    #[default]
    Html,
    /// Full-page PNG.
    Screenshot,
    Pdf,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::Html => "html",
            RenderMode::Screenshot => "screenshot",
            RenderMode::Pdf => "pdf",
        }
    }
}

impl FromStr for RenderMode {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "html" => Ok(RenderMode::Html),
            "screenshot" | "png" => Ok(RenderMode::Screenshot),
            "pdf" => Ok(RenderMode::Pdf),
            other => Err(ProxyError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured result of a committed navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    Html(String),
    Image(Vec<u8>),
    Pdf(Vec<u8>),
}

#[derive(Debug)]
pub enum NavigationOutcome {
    Committed(PageContent),
    /// Every step ran out of time.
    TimedOut { detail: String },
    /// The engine reported a network failure in at least one step.
    NetworkError { kind: NetworkErrorKind, detail: String },
}

impl NavigationOutcome {
    pub fn into_result(self) -> Result<PageContent, ProxyError> {
        match self {
            NavigationOutcome::Committed(content) => Ok(content),
            NavigationOutcome::TimedOut { detail } => Err(ProxyError::NavigationFailed {
                kind: NavigationFailure::Timeout,
                detail,
            }),
            NavigationOutcome::NetworkError { kind, detail } => Err(ProxyError::NavigationFailed {
                kind: match kind {
                    NetworkErrorKind::Unresolved | NetworkErrorKind::Refused => NavigationFailure::Unresolved,
                    NetworkErrorKind::Other => NavigationFailure::Other,
                },
                detail,
            }),
        }
    }
}

/// One entry of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationStep {
    pub condition: WaitCondition,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    steps: Vec<NavigationStep>,
    settle: Duration,
    scroll: bool,
    post_scroll_settle: Duration,
}

impl Navigator {
    pub fn from_config(config: &NavigationConfig) -> Self {
        let idle_window = Duration::from_millis(config.idle_window_ms);
        Self {
            steps: config
                .strategies
                .iter()
                .map(|s| NavigationStep {
                    condition: WaitCondition::from_kind(s.condition, idle_window),
                    timeout: Duration::from_secs(s.timeout_secs),
                })
                .collect(),
            settle: Duration::from_millis(config.settle_ms),
            scroll: config.scroll,
            post_scroll_settle: Duration::from_millis(config.post_scroll_settle_ms),
        }
    }

    pub fn steps(&self) -> &[NavigationStep] {
        &self.steps
    }

    /// Load `target`, let it settle and capture it in `mode`.
    ///
    /// `Err` is reserved for engine failures; a page that cannot be loaded is
    /// an `Ok` outcome other than `Committed`.
    pub async fn navigate(
        &self,
        page: &dyn RenderPage,
        target: &TargetUrl,
        mode: RenderMode,
    ) -> Result<NavigationOutcome, RenderError> {
        let mut timed_out: Vec<String> = Vec::new();
        let mut network: Option<(NetworkErrorKind, String)> = None;
        let mut committed = false;

        for step in &self.steps {
            let started = Instant::now();
            let result = tokio::time::timeout(step.timeout, page.navigate(target.url(), step.condition)).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(Ok(())) => {
                    metrics::record_navigation_attempt(step.condition.label(), "committed");
                    tracing::debug!(target_url = %target, strategy = %step.condition, elapsed_ms, "Navigation committed");
                    committed = true;
                    break;
                }
                Ok(Err(NavigationError::Timeout(detail))) => {
                    metrics::record_navigation_attempt(step.condition.label(), "timeout");
                    tracing::info!(target_url = %target, strategy = %step.condition, elapsed_ms, "Navigation step timed out");
                    timed_out.push(format!("{}: {}", step.condition, detail));
                }
                Ok(Err(NavigationError::Network { kind, detail })) => {
                    metrics::record_navigation_attempt(step.condition.label(), "network_error");
                    tracing::info!(target_url = %target, strategy = %step.condition, error = %detail, "Navigation step failed");
                    network = Some((kind, detail));
                }
                Ok(Err(NavigationError::Engine(e))) => {
                    metrics::record_navigation_attempt(step.condition.label(), "engine_error");
                    return Err(e);
                }
                Err(_) => {
                    metrics::record_navigation_attempt(step.condition.label(), "timeout");
                    tracing::info!(target_url = %target, strategy = %step.condition, elapsed_ms, "Navigation step timed out");
                    timed_out.push(format!(
                        "{} not reached within {} ms",
                        step.condition,
                        step.timeout.as_millis()
                    ));
                }
            }
        }

        if !committed {
            // A concrete network error explains the failure better than the timeouts it caused.
            return Ok(match network {
                Some((kind, detail)) => NavigationOutcome::NetworkError { kind, detail },
                None => NavigationOutcome::TimedOut {
                    detail: timed_out.join("; "),
                },
            });
        }

        self.settle(page).await;

        let content = match mode {
            RenderMode::Html => PageContent::Html(page.content().await?),
            RenderMode::Screenshot => PageContent::Image(page.screenshot().await?),
            RenderMode::Pdf => PageContent::Pdf(page.pdf().await?),
        };
        Ok(NavigationOutcome::Committed(content))
    }

    async fn settle(&self, page: &dyn RenderPage) {
        tokio::time::sleep(self.settle).await;

        if self.scroll {
            if let Err(e) = page.evaluate(SCROLL_SCRIPT).await {
                tracing::debug!(error = %e, "Scroll pass skipped");
            }
            tokio::time::sleep(self.post_scroll_settle).await;
        }
    }
}
