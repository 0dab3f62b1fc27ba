//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, query parsing, proxy origin)
//!     → handlers.rs (/proxy, /resource, /health)
//!     → [dispatcher classifies and fetches or renders]
//!     → response.rs (status, content type, proxy headers)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, RequestIdExt, X_REQUEST_ID};
pub use response::{X_PROXIED_URL, X_PROXY_CLASS, X_PROXY_STUB};
pub use server::{AppState, HttpServer};
