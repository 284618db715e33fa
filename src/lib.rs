//! # Binix Router - Cross-Process Query Routing
//!
//! Lets script running in a renderer process call into native handlers in
//! the browser process and receive answers asynchronously, with support for
//! persistent queries and cancellation from either side.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - **message_router**: browser-side and renderer-side routers, the wire
//!   codec and the pending-query tables
//! - **process**: process roles, browser/frame handles, process messages,
//!   shared memory regions and the IPC channel
//! - **js_engine**: Boa-backed script contexts
//! - **utils**: Shared utilities, id generation and error types

pub mod js_engine;
pub mod message_router;
pub mod process;
pub mod utils;

// Re-export main types for convenience
pub use message_router::{
    BrowserSideRouter, Callback, MessageRouterConfig, Payload, QueryHandler, RendererSideRouter,
};
pub use utils::error::{RouterError, Result};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = "Binix Router";
