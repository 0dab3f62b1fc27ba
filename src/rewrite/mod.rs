//! Document rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! Serialized DOM + RewriteContext
//!     → html.rs (strip CSP meta, proxy script/link/img references,
//!                add <base>, insert shim before </head>)
//!     → shim.rs (fetch / XHR / link-click overrides, shim.js template)
//!     → rewritten markup
//! ```

pub mod context;
pub mod html;
pub mod shim;

pub use context::{RewriteContext, PROXY_PATH};
pub use html::{rewrite_document, RewriteError};
