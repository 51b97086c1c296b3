//! wa-web: Web shell for warehouse-agent
//!
//! A single page with one text field and a read-only answer area, backed
//! by a JSON endpoint that runs one dispatcher turn per request.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wa_web::{WebConfig, WebServer};
//!
//! let server = WebServer::new(WebConfig::from(&config.server), dispatcher);
//! server.run_until(shutdown_signal()).await?;
//! ```

pub mod api;
pub mod error;
pub mod server;

pub use api::{AskRequest, AskResponse, WebState, create_router};
pub use error::{Result, WebError};
pub use server::{WebConfig, WebServer};
