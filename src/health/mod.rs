//! Liveness reporting.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → RenderSessionManager::status() (never launches the engine)
//!     → HealthReport (JSON)
//! ```
//!
//! # Design Decisions
//! - The proxy is "ok" while it can answer; a failed engine launch shows up
//!   in the session block, not as a non-200 status, because direct fetches
//!   still work without the engine

use serde::Serialize;
use std::time::Instant;

use crate::render::{RenderSessionManager, SessionSnapshot, SessionStatus};

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    /// True once the shared session is Ready.
    pub session_initialized: bool,
    pub session: SessionSnapshot,
}

impl HealthReport {
    pub fn collect(sessions: &RenderSessionManager, started: Instant) -> Self {
        let session = sessions.status();
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: started.elapsed().as_secs(),
            session_initialized: session.status == SessionStatus::Ready,
            session,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::render::{LaunchOptions, RenderBrowser, RenderEngine, RenderError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoEngine;

    #[async_trait]
    impl RenderEngine for NoEngine {
        async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn RenderBrowser>, RenderError> {
            Err(RenderError::Launch("unavailable".into()))
        }
    }

    #[tokio::test]
    async fn reports_uninitialized_session_without_launching() {
        let sessions = RenderSessionManager::new(Arc::new(NoEngine), RenderConfig::default(), "test");
        let report = HealthReport::collect(&sessions, Instant::now());

        assert_eq!(report.status, "ok");
        assert!(!report.session_initialized);
        assert_eq!(report.session.status, SessionStatus::Uninitialized);
        assert_eq!(sessions.launch_count(), 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["session"]["status"], "uninitialized");
    }
}
