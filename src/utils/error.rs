//! Error types for the Binix query router

use thiserror::Error;

/// Main error type for router operations
#[derive(Debug, Error)]
pub enum RouterError {
    /// The router configuration was rejected at construction
    #[error("Invalid router configuration: {0}")]
    InvalidConfig(String),
    /// Inter-process transport errors
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
    /// Malformed wire messages
    #[error("Protocol violation: {0}")]
    Codec(#[from] CodecError),
    /// Script engine errors
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    /// Configuration could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Transport-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpcError {
    /// The receiving end of the channel is gone
    #[error("channel to {0} process is closed")]
    ChannelClosed(&'static str),
    /// The frame was detached before the message could be sent
    #[error("frame {0} is no longer attached")]
    FrameDetached(i64),
    /// A shared memory region could not be allocated
    #[error("failed to allocate a shared memory region of {0} bytes")]
    SharedMemoryAllocation(usize),
}

/// Wire decoding errors. Any of these means the two peers disagree on the
/// message layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The message carries neither an argument list nor a valid shared region
    #[error("message '{0}' carries neither arguments nor a shared memory region")]
    EmptyMessage(String),
    /// An argument is missing from the list
    #[error("missing argument {index} in message '{name}'")]
    MissingArgument { name: String, index: usize },
    /// An argument has an unexpected value type
    #[error("argument {index} in message '{name}' has type {found}, expected {expected}")]
    UnexpectedType {
        name: String,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
    /// The shared region is smaller than the fixed header
    #[error("shared memory region of {size} bytes is shorter than its {header} byte header")]
    TruncatedRegion { size: usize, header: usize },
}

/// Script engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Script evaluation threw or failed to compile
    #[error("execution failed: {0}")]
    Execution(String),
    /// A native binding could not be installed
    #[error("failed to register '{0}' on the global object")]
    Registration(String),
    /// The context is already executing and cannot be re-entered
    #[error("script context is busy")]
    ContextBusy,
}

/// Convenience Result type for router operations
pub type Result<T> = std::result::Result<T, RouterError>;
