//! # plainweb
//!
//! A ridiculously simple web framework with server-side sessions.
//!
//! An application is one callback. For every request the framework sweeps
//! expired sessions, builds a [`RequestContext`], hands it to the callback
//! and turns whatever the callback decided into exactly one response:
//! a raw body, a rendered template, a redirect, a bare status, or a
//! `no result` placeholder.
//!
//! ## Features
//!
//! - **In-memory sessions**: 128-bit random identifiers, 30 minute idle expiry
//! - **One directive per request**: fixed resolution order, no surprises
//! - **Templates**: minijinja templates discovered by glob
//! - **Testable callbacks**: [`RequestContext::stub`] needs no server
//!
//! ## Quick Start
//!
//! ```no_run
//! use plainweb::{serve, RequestHandler, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> plainweb::Result<()> {
//!     plainweb::logging::try_init().ok();
//!
//!     let handler = RequestHandler::with_defaults(|req| {
//!         let html = format!("<html>{} {}</html>", req.method(), req.path());
//!         req.set_html(html);
//!         Ok(())
//!     })?;
//!
//!     serve(ServerConfig::default(), handler).await
//! }
//! ```
//!
//! [`RequestHandler::new`] takes an explicit store and renderer instead:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use plainweb::{RequestHandler, SessionStore, Templates};
//!
//! # fn main() -> plainweb::Result<()> {
//! let store = Arc::new(SessionStore::new());
//! let templates = Arc::new(Templates::from_glob("templates/*.html")?);
//! let handler = RequestHandler::new(|_req| Ok(()), store, templates);
//! # let _ = handler;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod logging;
pub mod resolver;
pub mod server;
pub mod session;
pub mod template;
pub mod watchdog;

// Re-export commonly used types
pub use context::{Model, RequestContext};
pub use error::{Error, Result};
pub use handler::{InboundRequest, RequestHandler, ServeFn};
pub use resolver::{resolve, Resolution};
pub use server::{create_router, serve, serve_with_shutdown, ServerConfig};
pub use session::{SessionInfo, SessionSnapshot, SessionStore};
pub use template::{TemplateRenderer, Templates};
pub use watchdog::Watchdog;
