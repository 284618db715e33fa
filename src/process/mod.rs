//! Multi-process plumbing underneath the query router
//!
//! - Browser process: owns the browser-side router and the query handlers
//! - Renderer process: owns the script contexts and the renderer-side router
//!
//! Messages are one-way and named. Their body is either a structured
//! argument list or a sealed shared memory region.

mod browser;
mod ipc;
mod message;
mod shared_memory;

pub use browser::{Browser, BrowserId, Frame, FrameId};
pub use ipc::{IpcChannel, IpcMessage, MessageSink};
pub use message::{ListValue, ProcessMessage, Value, ValueType};
pub use shared_memory::{SharedMemoryRegion, SharedProcessMessageBuilder};

/// Process roles taking part in routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessType {
    /// Main browser process
    Browser,
    /// Renderer process hosting script contexts
    Renderer,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Browser => "Browser",
            ProcessType::Renderer => "Renderer",
        }
    }
}
