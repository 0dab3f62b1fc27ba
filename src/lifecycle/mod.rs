//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → apply CLI overrides → validate → build server
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Stop accepting → drain in-flight requests → close the engine → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The engine is launched lazily by the first document request, never at startup
//! - The engine process is closed after the HTTP server drains

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
