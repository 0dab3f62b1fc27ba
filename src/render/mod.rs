//! Rendering subsystem.
//!
//! # Data Flow
//! ```text
//! Document request
//!     → session.rs (acquire the shared Ready session, launching once)
//!     → page.rs (lease one page, closed on every exit path)
//!     → navigation.rs (fallback chain of wait conditions, settle, capture)
//!           ↳ interceptor.rs (deny-listed hosts aborted while loading)
//!     → PageContent (html / png / pdf)
//! ```
//!
//! # Design Decisions
//! - The engine sits behind the traits in engine.rs; chromium.rs is one
//!   implementation, tests use in-process fakes
//! - One engine process for the whole server, many concurrent pages
//! - Launch flags and executable search depend on the deployment profile

pub mod engine;
pub mod executable;
pub mod interceptor;
pub mod navigation;
pub mod page;
pub mod session;

#[cfg(feature = "chromium")]
pub mod chromium;

pub use engine::{
    InterceptDecision, InterceptedRequest, LaunchOptions, NavigationError, NetworkErrorKind, RenderBrowser,
    RenderEngine, RenderError, RenderPage, RequestInterceptor, WaitCondition,
};
pub use interceptor::RequestFilter;
pub use navigation::{NavigationOutcome, Navigator, PageContent, RenderMode};
pub use page::PageLease;
pub use session::{RenderSession, RenderSessionManager, SessionSnapshot, SessionStatus};

#[cfg(feature = "chromium")]
pub use chromium::ChromiumEngine;

use std::sync::Arc;

/// Engine used by the server binary.
#[cfg(feature = "chromium")]
pub fn default_engine() -> Arc<dyn RenderEngine> {
    Arc::new(ChromiumEngine)
}

/// Engine used by the server binary. Built without an engine backend,
/// document requests fail with 503 while direct fetches keep working.
#[cfg(not(feature = "chromium"))]
pub fn default_engine() -> Arc<dyn RenderEngine> {
    Arc::new(Unavailable)
}

#[cfg(not(feature = "chromium"))]
struct Unavailable;

#[cfg(not(feature = "chromium"))]
#[async_trait::async_trait]
impl RenderEngine for Unavailable {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn RenderBrowser>, RenderError> {
        Err(RenderError::Launch(
            "built without the `chromium` feature".to_string(),
        ))
    }
}
