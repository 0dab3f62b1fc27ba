//! Rendering reverse proxy.
//!
//! Fetches arbitrary pages through a shared headless engine, rewrites their
//! markup so every follow-up request comes back through the proxy, and
//! serves sub-resources and API calls with a plain HTTP client.
//!
//! ```text
//!  client ──▶ http ──▶ dispatch ──┬─ classify ─▶ Document ──▶ render ──▶ rewrite ──┐
//!                                 │                                                │
//!                                 └────────────▶ SubResource / ApiCall ─▶ fetch ───┤
//!  client ◀──────────────────────────────────────────────────────────────────────◀┘
//! ```

// Core subsystems
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod http;
pub mod render;
pub mod rewrite;
pub mod target;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
