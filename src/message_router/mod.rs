//! Query routing between script and browser
//!
//! Script in a renderer calls the query function with a request and
//! callbacks. The renderer-side router forwards the request to the browser
//! process, where the browser-side router offers it to the registered
//! handlers. A handler answers once, or many times for a persistent query,
//! and the answers travel back to the script callbacks.
//!
//! ```text
//! script ── query ──▶ RendererSideRouter ══ <query>Msg ══▶ BrowserSideRouter ──▶ QueryHandler
//!   ▲                                                                              │
//!   └── onSuccess / onFailure ◀── RendererSideRouter ◀══ <query>Msg ══ Callback ◀──┘
//! ```

pub mod browser_info_map;
pub mod browser_side;
pub mod codec;
pub mod config;
pub mod renderer_side;

pub use browser_side::{BrowserSideRouter, Callback, QueryHandler};
pub use codec::Payload;
pub use config::MessageRouterConfig;
pub use renderer_side::RendererSideRouter;

/// Identifies a script context within one renderer
pub type ContextId = i32;

/// Identifies a request within one renderer
pub type RequestId = i32;

/// Identifies a claimed query within the browser process
pub type QueryId = i64;

/// Error code sent for queries that were canceled or that no handler claimed
pub const CANCELED_ERROR_CODE: i32 = -1;

/// Error message sent alongside [`CANCELED_ERROR_CODE`]
pub const CANCELED_ERROR_MESSAGE: &str = "The query has been canceled";
