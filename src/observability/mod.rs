//! Observability subsystem.
//!
//! ```text
//! handlers, fetcher, session manager, navigator, page leases, request filter
//!     → logging.rs (tracing events, request-id span from tower-http)
//!     → metrics.rs (render_proxy_* counters, histograms, open-pages gauge)
//!
//! Sinks:
//!     stdout, pretty while developing and JSON behind a collector
//!     Prometheus scrape listener, only when metrics_enabled
//! ```

pub mod logging;
pub mod metrics;
