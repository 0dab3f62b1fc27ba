//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the three routes
//! - Wire up middleware (request ID, tracing, CORS header, timeout, body limit)
//! - Build the dispatcher and its subsystems from configuration
//! - Apply classifier reloads from the config watcher
//! - Close the engine process after the server drains

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Request},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::classify::{self, ClassifierRules, SharedRules};
use crate::config::validation::validate_config;
use crate::config::ProxyConfig;
use crate::dispatch::Dispatcher;
use crate::fetch::DirectFetcher;
use crate::http::handlers;
use crate::http::request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
use crate::lifecycle::StartupError;
use crate::render::{Navigator, RenderEngine, RenderSessionManager};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub public_origin: Option<Arc<str>>,
    pub started: Instant,
}

/// HTTP server for the rendering proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    rules: SharedRules,
    dispatcher: Dispatcher,
}

impl HttpServer {
    /// Build every subsystem from `config`. The engine is not launched here;
    /// the first document request does that.
    pub fn new(config: ProxyConfig, engine: Arc<dyn RenderEngine>) -> Result<Self, StartupError> {
        validate_config(&config).map_err(StartupError::Invalid)?;
        let rules = classify::shared(ClassifierRules::from_config(&config.classifier)?);
        let fetcher = DirectFetcher::new(&config.fetcher, rules.clone())?;
        let sessions = RenderSessionManager::new(engine, config.render.clone(), config.fetcher.user_agent.clone());
        let navigator = Navigator::from_config(&config.navigation);
        let dispatcher = Dispatcher::new(rules.clone(), fetcher, sessions, navigator);

        let state = AppState {
            dispatcher: dispatcher.clone(),
            public_origin: config.listener.public_origin.as_deref().map(Arc::from),
            started: Instant::now(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            rules,
            dispatcher,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let body_limit = config.security.max_body_size;

        Router::new()
            .route("/proxy", get(handlers::proxy).post(handlers::proxy))
            .route("/resource", get(handlers::resource))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            request_id = %request.headers().request_id(),
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    }))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(SetResponseHeaderLayer::overriding(
                        header::ACCESS_CONTROL_ALLOW_ORIGIN,
                        HeaderValue::from_static("*"),
                    ))
                    .layer(RequestBodyLimitLayer::new(body_limit))
                    .layer(DefaultBodyLimit::max(body_limit)),
            )
    }

    /// Run until `shutdown` fires, then drain and close the engine.
    ///
    /// Every config received on `config_updates` replaces the classifier
    /// rule set; other sections only take effect on restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            profile = ?self.config.render.profile,
            request_timeout_secs = self.config.timeouts.request_secs,
            "HTTP server starting"
        );

        let rules = self.rules.clone();
        let reload = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                match ClassifierRules::from_config(&config.classifier) {
                    Ok(next) => {
                        rules.store(Arc::new(next));
                        tracing::info!("Classifier rules swapped");
                    }
                    Err(e) => tracing::error!(error = %e, "Reloaded classifier rules rejected"),
                }
            }
        });

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await;

        reload.abort();
        self.dispatcher.sessions().shutdown().await;
        tracing::info!("HTTP server stopped");
        result
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
