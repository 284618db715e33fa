//! Shared utilities and error types

pub mod error;
pub mod id_generator;

pub use error::{CodecError, IpcError, Result, RouterError, ScriptError};
pub use id_generator::{IdGenerator, RESERVED_ID, RouterId};
