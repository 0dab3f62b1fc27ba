//! Rendering engine collaborator interfaces.
//!
//! The proxy never talks to a browser directly; it goes through these traits
//! so the session manager, navigator and dispatcher stay engine-agnostic and
//! testable with an in-process fake.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::WaitConditionKind;

/// Everything needed to start one engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
}

/// When a navigation counts as committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// At most `max_in_flight` requests open for `idle_window`.
    NetworkIdle { max_in_flight: usize, idle_window: Duration },
    Load,
    DomContentLoaded,
}

impl WaitCondition {
    pub fn from_kind(kind: WaitConditionKind, idle_window: Duration) -> Self {
        match kind {
            WaitConditionKind::NetworkIdle0 => WaitCondition::NetworkIdle { max_in_flight: 0, idle_window },
            WaitConditionKind::NetworkIdle2 => WaitCondition::NetworkIdle { max_in_flight: 2, idle_window },
            WaitConditionKind::Load => WaitCondition::Load,
            WaitConditionKind::DomContentLoaded => WaitCondition::DomContentLoaded,
        }
    }

    /// Stable name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            WaitCondition::NetworkIdle { max_in_flight: 0, .. } => "networkidle0",
            WaitCondition::NetworkIdle { .. } => "networkidle2",
            WaitCondition::Load => "load",
            WaitCondition::DomContentLoaded => "domcontentloaded",
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failures of the engine itself (not of the page being loaded).
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no rendering engine executable found (searched: {0})")]
    ExecutableNotFound(String),

    #[error("engine launch failed: {0}")]
    Launch(String),

    #[error("engine connection lost")]
    Disconnected,

    #[error("page operation failed: {0}")]
    Page(String),

    #[error("capture failed: {0}")]
    Capture(String),
}

/// Network-level navigation failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// DNS lookup failed.
    Unresolved,
    /// The host refused or was unreachable.
    Refused,
    Other,
}

impl NetworkErrorKind {
    /// Categorize an engine error string such as `net::ERR_NAME_NOT_RESOLVED`.
    pub fn from_error_text(text: &str) -> Self {
        const UNRESOLVED: &[&str] = &["ERR_NAME_NOT_RESOLVED", "ERR_NAME_RESOLUTION_FAILED"];
        const REFUSED: &[&str] = &[
            "ERR_CONNECTION_REFUSED",
            "ERR_ADDRESS_UNREACHABLE",
            "ERR_CONNECTION_RESET",
            "ERR_CONNECTION_CLOSED",
        ];

        if UNRESOLVED.iter().any(|code| text.contains(code)) {
            NetworkErrorKind::Unresolved
        } else if REFUSED.iter().any(|code| text.contains(code)) {
            NetworkErrorKind::Refused
        } else {
            NetworkErrorKind::Other
        }
    }
}

/// Why a single navigation attempt did not commit.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("navigation timed out: {0}")]
    Timeout(String),

    #[error("{detail}")]
    Network { kind: NetworkErrorKind, detail: String },

    #[error(transparent)]
    Engine(#[from] RenderError),
}

/// Verdict for one outbound sub-request of a page being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    Continue,
    Block,
}

/// An outbound request observed while a page loads.
#[derive(Debug, Clone, Copy)]
pub struct InterceptedRequest<'a> {
    pub url: &'a str,
    /// Engine resource type, e.g. `Document`, `Script`, `Image`.
    pub resource_type: &'a str,
}

/// Synchronous allow/deny predicate consulted for every page sub-request.
pub trait RequestInterceptor: Send + Sync {
    fn decide(&self, request: &InterceptedRequest<'_>) -> InterceptDecision;
}

/// Starts engine processes.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn RenderBrowser>, RenderError>;
}

/// A running engine process.
#[async_trait]
pub trait RenderBrowser: Send + Sync {
    /// Whether the control connection to the process is still open.
    fn is_connected(&self) -> bool;

    async fn new_page(
        &self,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Result<Box<dyn RenderPage>, RenderError>;

    async fn close(&self);
}

/// One browsing context, used for a single navigation.
#[async_trait]
pub trait RenderPage: Send + Sync {
    /// Navigate and wait for `condition`. Callers bound this with their own timeout.
    async fn navigate(&self, url: &Url, condition: WaitCondition) -> Result<(), NavigationError>;

    async fn evaluate(&self, script: &str) -> Result<(), RenderError>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String, RenderError>;

    /// Full-page PNG.
    async fn screenshot(&self) -> Result<Vec<u8>, RenderError>;

    async fn pdf(&self) -> Result<Vec<u8>, RenderError>;

    async fn close(self: Box<Self>);
}
