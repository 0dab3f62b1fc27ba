//! Render session manager.
//!
//! Owns the single engine process shared by all requests.
//!
//! ```text
//! Uninitialized ──acquire──▶ Initializing ──ok──▶ Ready
//!       ▲                        │                  │
//!       │                      error          disconnected /
//!       │                        ▼             invalidated
//!       └──────acquire────── Failed ◀───────────────┘ (→ Uninitialized)
//! ```
//!
//! The launch runs in its own task, so a caller that gives up (client
//! disconnect, request timeout) never leaves the state stuck in
//! `Initializing`. Waiters park on a [`Notify`] and re-check the state.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::config::RenderConfig;
use crate::error::ProxyError;
use crate::observability::metrics;
use crate::render::engine::{RenderBrowser, RenderEngine, RenderError};
use crate::render::executable;

/// Upper bound on a single engine launch.
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Point-in-time view of the manager, reported by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub launches: u64,
    pub last_error: Option<String>,
}

/// A Ready session handed to a request.
#[derive(Clone)]
pub struct RenderSession {
    browser: Arc<dyn RenderBrowser>,
    generation: u64,
}

impl RenderSession {
    pub fn browser(&self) -> &Arc<dyn RenderBrowser> {
        &self.browser
    }

    /// Launch attempt that produced this session; equal for every holder of
    /// the same process.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("generation", &self.generation)
            .field("connected", &self.browser.is_connected())
            .finish()
    }
}

enum Phase {
    Uninitialized,
    Initializing { attempt: u64 },
    Ready(RenderSession),
    Failed { attempt: u64, reason: String },
}

struct State {
    phase: Phase,
    shut_down: bool,
}

/// What `acquire` does after inspecting the state under the lock.
enum Step {
    Done(RenderSession),
    Fail(String),
    Wait(u64),
    Launch(u64),
}

struct Inner {
    engine: Arc<dyn RenderEngine>,
    render: RenderConfig,
    user_agent: String,
    state: Mutex<State>,
    changed: Notify,
    attempts: AtomicU64,
    launches: AtomicU64,
    closing: AtomicBool,
}

/// Shared handle to the process-wide render session.
#[derive(Clone)]
pub struct RenderSessionManager {
    inner: Arc<Inner>,
}

impl RenderSessionManager {
    pub fn new(engine: Arc<dyn RenderEngine>, render: RenderConfig, user_agent: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                render,
                user_agent: user_agent.into(),
                state: Mutex::new(State {
                    phase: Phase::Uninitialized,
                    shut_down: false,
                }),
                changed: Notify::new(),
                attempts: AtomicU64::new(0),
                launches: AtomicU64::new(0),
                closing: AtomicBool::new(false),
            }),
        }
    }

    /// Return the Ready session, launching it if needed.
    ///
    /// Concurrent callers during a launch wait for that launch instead of
    /// starting their own, and all receive its outcome.
    pub async fn acquire(&self) -> Result<RenderSession, ProxyError> {
        let mut awaited: Option<u64> = None;

        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut stale = None;
            let step = {
                let mut state = self.lock_state();
                if state.shut_down {
                    return Err(ProxyError::SessionLaunchFailed(
                        "render session is shutting down".to_string(),
                    ));
                }

                let step = match &state.phase {
                    Phase::Ready(session) if session.browser.is_connected() => Step::Done(session.clone()),
                    Phase::Ready(session) => {
                        tracing::warn!(generation = session.generation, "Render session disconnected");
                        stale = Some(session.clone());
                        Step::Launch(self.next_attempt())
                    }
                    Phase::Initializing { attempt } => Step::Wait(*attempt),
                    Phase::Failed { attempt, reason } if awaited == Some(*attempt) => Step::Fail(reason.clone()),
                    Phase::Uninitialized | Phase::Failed { .. } => Step::Launch(self.next_attempt()),
                };

                if let Step::Launch(attempt) = step {
                    state.phase = Phase::Initializing { attempt };
                }
                step
            };

            // The process may outlive its connection; reap it off the request path.
            if let Some(session) = stale {
                tokio::spawn(async move { session.browser.close().await });
            }

            match step {
                Step::Done(session) => return Ok(session),
                Step::Fail(reason) => return Err(ProxyError::SessionLaunchFailed(reason)),
                Step::Wait(attempt) => {
                    tracing::debug!(attempt, "Waiting for render session launch");
                    awaited = Some(attempt);
                }
                Step::Launch(attempt) => {
                    awaited = Some(attempt);
                    let manager = self.clone();
                    tokio::spawn(async move { manager.launch(attempt).await });
                }
            }

            notified.await;
        }
    }

    async fn launch(&self, attempt: u64) {
        let started = Instant::now();
        tracing::info!(attempt, profile = ?self.inner.render.profile, "Launching render session");

        let result = match executable::launch_options(&self.inner.render, &self.inner.user_agent) {
            Ok(options) => {
                tracing::info!(executable = %options.executable.display(), "Resolved engine executable");
                match tokio::time::timeout(LAUNCH_TIMEOUT, self.inner.engine.launch(&options)).await {
                    Ok(result) => result,
                    Err(_) => Err(RenderError::Launch(format!(
                        "engine did not start within {}s",
                        LAUNCH_TIMEOUT.as_secs()
                    ))),
                }
            }
            Err(e) => Err(e),
        };

        let orphan = {
            let mut state = self.lock_state();
            match result {
                Ok(browser) if state.shut_down => Some(browser),
                Ok(browser) => {
                    self.inner.launches.fetch_add(1, Ordering::SeqCst);
                    metrics::record_session_launch(true);
                    tracing::info!(
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Render session ready"
                    );
                    state.phase = Phase::Ready(RenderSession {
                        browser,
                        generation: attempt,
                    });
                    None
                }
                Err(e) => {
                    metrics::record_session_launch(false);
                    tracing::error!(attempt, error = %e, "Render session launch failed");
                    state.phase = Phase::Failed {
                        attempt,
                        reason: e.to_string(),
                    };
                    None
                }
            }
        };

        self.inner.changed.notify_waiters();

        if let Some(browser) = orphan {
            tracing::info!("Closing engine launched during shutdown");
            browser.close().await;
        }
    }

    /// Drop `session` so the next `acquire` relaunches. No-op if the
    /// manager already moved on to a newer session.
    pub async fn invalidate(&self, session: &RenderSession) {
        let stale = {
            let mut state = self.lock_state();
            match &state.phase {
                Phase::Ready(current) if current.generation == session.generation => {
                    state.phase = Phase::Uninitialized;
                    true
                }
                _ => false,
            }
        };

        if stale {
            tracing::warn!(generation = session.generation, "Render session invalidated");
            session.browser.close().await;
        }
    }

    pub fn status(&self) -> SessionSnapshot {
        let state = self.lock_state();
        let (status, last_error) = match &state.phase {
            Phase::Uninitialized => (SessionStatus::Uninitialized, None),
            Phase::Initializing { .. } => (SessionStatus::Initializing, None),
            Phase::Ready(session) if session.browser.is_connected() => (SessionStatus::Ready, None),
            // Disconnected but not yet noticed by a request.
            Phase::Ready(_) => (SessionStatus::Uninitialized, None),
            Phase::Failed { reason, .. } => (SessionStatus::Failed, Some(reason.clone())),
        };

        SessionSnapshot {
            status,
            launches: self.launch_count(),
            last_error,
        }
    }

    /// Successful engine launches since startup.
    pub fn launch_count(&self) -> u64 {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Close the engine process. Called once, on process termination.
    pub async fn shutdown(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        let session = {
            let mut state = self.lock_state();
            state.shut_down = true;
            match std::mem::replace(&mut state.phase, Phase::Uninitialized) {
                Phase::Ready(session) => Some(session),
                _ => None,
            }
        };
        self.inner.changed.notify_waiters();

        if let Some(session) = session {
            tracing::info!(generation = session.generation, "Closing render session");
            session.browser.close().await;
        }
    }

    fn next_attempt(&self) -> u64 {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::engine::{LaunchOptions, RenderPage, RequestInterceptor};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubBrowser {
        connected: AtomicBool,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl RenderBrowser for StubBrowser {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn new_page(
            &self,
            _interceptor: Arc<dyn RequestInterceptor>,
        ) -> Result<Box<dyn RenderPage>, RenderError> {
            Err(RenderError::Page("not used".into()))
        }

        async fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    struct CountingEngine {
        launches: AtomicUsize,
        fail_first: usize,
        delay: Duration,
        browsers: Mutex<Vec<Arc<StubBrowser>>>,
    }

    impl CountingEngine {
        fn new(fail_first: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                launches: AtomicUsize::new(0),
                fail_first,
                delay,
                browsers: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RenderEngine for CountingEngine {
        async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn RenderBrowser>, RenderError> {
            let n = self.launches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if n < self.fail_first {
                return Err(RenderError::Launch("boom".into()));
            }
            let browser = Arc::new(StubBrowser {
                connected: AtomicBool::new(true),
                closed: AtomicUsize::new(0),
            });
            self.browsers.lock().unwrap().push(browser.clone());
            Ok(browser)
        }
    }

    fn manager(engine: Arc<CountingEngine>) -> RenderSessionManager {
        let render = RenderConfig {
            executable: Some(std::env::current_exe().unwrap()),
            ..RenderConfig::default()
        };
        RenderSessionManager::new(engine, render, "test-agent")
    }

    #[tokio::test]
    async fn concurrent_first_requests_launch_once() {
        let engine = CountingEngine::new(0, Duration::from_millis(50));
        let sessions = manager(engine.clone());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.acquire().await })
            })
            .collect();

        let mut generations = Vec::new();
        for handle in handles {
            generations.push(handle.await.unwrap().unwrap().generation());
        }

        assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
        assert_eq!(sessions.launch_count(), 1);
        assert!(generations.iter().all(|g| *g == generations[0]));
        assert_eq!(sessions.status().status, SessionStatus::Ready);
    }

    #[tokio::test]
    async fn failed_launch_reaches_all_waiters_and_retries_lazily() {
        let engine = CountingEngine::new(1, Duration::from_millis(20));
        let sessions = manager(engine.clone());

        let first = sessions.clone();
        let second = sessions.clone();
        let (a, b) = tokio::join!(first.acquire(), second.acquire());
        assert!(matches!(a, Err(ProxyError::SessionLaunchFailed(_))));
        assert!(matches!(b, Err(ProxyError::SessionLaunchFailed(_))));
        assert_eq!(engine.launches.load(Ordering::SeqCst), 1);

        let snapshot = sessions.status();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot.last_error.unwrap().contains("boom"));

        sessions.acquire().await.unwrap();
        assert_eq!(engine.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disconnected_session_is_replaced() {
        let engine = CountingEngine::new(0, Duration::ZERO);
        let sessions = manager(engine.clone());

        let first = sessions.acquire().await.unwrap();
        engine.browsers.lock().unwrap()[0].connected.store(false, Ordering::SeqCst);

        let second = sessions.acquire().await.unwrap();
        assert_ne!(first.generation(), second.generation());
        assert_eq!(sessions.launch_count(), 2);

        tokio::task::yield_now().await;
        let browsers = engine.browsers.lock().unwrap();
        assert_eq!(browsers[0].closed.load(Ordering::SeqCst), 1);
        assert_eq!(browsers[1].closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalidate_ignores_stale_handles() {
        let engine = CountingEngine::new(0, Duration::ZERO);
        let sessions = manager(engine.clone());

        let first = sessions.acquire().await.unwrap();
        sessions.invalidate(&first).await;
        let second = sessions.acquire().await.unwrap();

        // A late invalidation for the old session must not drop the new one.
        sessions.invalidate(&first).await;
        let third = sessions.acquire().await.unwrap();
        assert_eq!(second.generation(), third.generation());
        assert_eq!(engine.browsers.lock().unwrap()[0].closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_engine_and_refuses_new_sessions() {
        let engine = CountingEngine::new(0, Duration::ZERO);
        let sessions = manager(engine.clone());

        sessions.acquire().await.unwrap();
        sessions.shutdown().await;

        assert_eq!(engine.browsers.lock().unwrap()[0].closed.load(Ordering::SeqCst), 1);
        assert!(matches!(sessions.acquire().await, Err(ProxyError::SessionLaunchFailed(_))));
        assert_eq!(sessions.status().status, SessionStatus::Uninitialized);
    }
}
