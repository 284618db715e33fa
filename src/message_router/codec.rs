//! Wire encoding for query traffic
//!
//! Requests travel renderer → browser, responses browser → renderer. Each
//! direction has two encodings:
//!
//! - **Inline**: fields stored in the message's argument list. Used when the
//!   payload is shorter than the configured threshold.
//! - **Shared**: a fixed little-endian header followed by the raw payload
//!   bytes in a sealed shared memory region. Used for large payloads.
//!
//! Failure responses and cancel requests are always inline.

use bytes::{Buf, BufMut};

use super::{ContextId, RequestId};
use crate::process::{ListValue, ProcessMessage, SharedProcessMessageBuilder, ValueType};
use crate::utils::{CodecError, IpcError};

// Inline argument positions shared by every message shape.
const CONTEXT_ID: usize = 0;
const REQUEST_ID: usize = 1;

// Renderer → browser.
const RENDERER_PAYLOAD: usize = 2;
const IS_PERSISTENT: usize = 3;

// Browser → renderer.
const IS_SUCCESS: usize = 2;
const BROWSER_PAYLOAD: usize = 3;
const ERROR_CODE: usize = 3;
const ERROR_MESSAGE: usize = 4;

/// `context_id: i32, request_id: i32, is_persistent: u8, is_binary: u8`
pub const REQUEST_HEADER_SIZE: usize = 10;
/// `context_id: i32, request_id: i32, is_binary: u8`
pub const RESPONSE_HEADER_SIZE: usize = 9;

/// Request or response body
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Payload {
    /// No payload at all
    #[default]
    Empty,
    String(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Length in bytes as it would appear on the wire
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Empty => 0,
            Payload::String(value) => value.len(),
            Payload::Binary(value) => value.len(),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Binary(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Empty => &[],
            Payload::String(value) => value.as_bytes(),
            Payload::Binary(value) => value,
        }
    }

    fn set_inline(&self, args: &mut ListValue, index: usize) {
        match self {
            Payload::Empty => args.set_null(index),
            Payload::String(value) => args.set_string(index, value.clone()),
            Payload::Binary(value) => args.set_binary(index, value.clone()),
        }
    }

    fn from_region(bytes: &[u8], is_binary: bool) -> Self {
        if is_binary {
            Payload::Binary(bytes.to_vec())
        } else {
            Payload::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::String(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::String(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Binary(value.to_vec())
    }
}

/// A query request as sent by the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererMessage {
    pub context_id: ContextId,
    pub request_id: RequestId,
    pub persistent: bool,
    pub payload: Payload,
}

/// A query response as sent by the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserMessage {
    Success {
        context_id: ContextId,
        request_id: RequestId,
        payload: Payload,
    },
    Failure {
        context_id: ContextId,
        request_id: RequestId,
        error_code: i32,
        error_message: String,
    },
}

impl BrowserMessage {
    pub fn context_id(&self) -> ContextId {
        match self {
            BrowserMessage::Success { context_id, .. } | BrowserMessage::Failure { context_id, .. } => *context_id,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            BrowserMessage::Success { request_id, .. } | BrowserMessage::Failure { request_id, .. } => *request_id,
        }
    }
}

/// Whether a payload of this size goes through shared memory
fn use_shared_memory(payload: &Payload, threshold: usize) -> bool {
    !matches!(payload, Payload::Empty) && payload.byte_len() >= threshold
}

/// Encode a renderer → browser query request
pub fn build_renderer_message(threshold: usize, name: &str, request: &RendererMessage) -> ProcessMessage {
    if use_shared_memory(&request.payload, threshold) {
        let bytes = request.payload.as_bytes();
        let mut builder = SharedProcessMessageBuilder::create(name, REQUEST_HEADER_SIZE + bytes.len());
        if builder.is_valid() {
            let mut memory = builder.memory();
            memory.put_i32_le(request.context_id);
            memory.put_i32_le(request.request_id);
            memory.put_u8(request.persistent as u8);
            memory.put_u8(request.payload.is_binary() as u8);
            memory.put_slice(bytes);
            if let Some(message) = builder.build() {
                return message;
            }
        }
        log::warn!("{}; sending request inline", IpcError::SharedMemoryAllocation(REQUEST_HEADER_SIZE + bytes.len()));
    }

    let mut message = ProcessMessage::new(name);
    if let Some(args) = message.argument_list_mut() {
        args.set_int(CONTEXT_ID, request.context_id);
        args.set_int(REQUEST_ID, request.request_id);
        request.payload.set_inline(args, RENDERER_PAYLOAD);
        args.set_bool(IS_PERSISTENT, request.persistent);
    }
    message
}

/// Decode a renderer → browser query request
pub fn parse_renderer_message(message: &ProcessMessage) -> Result<RendererMessage, CodecError> {
    if let Some(args) = message.argument_list() {
        let reader = ArgReader::new(message.name(), args);
        return Ok(RendererMessage {
            context_id: reader.int(CONTEXT_ID)?,
            request_id: reader.int(REQUEST_ID)?,
            payload: reader.payload(RENDERER_PAYLOAD)?,
            persistent: reader.bool(IS_PERSISTENT)?,
        });
    }

    let memory = region_memory(message, REQUEST_HEADER_SIZE)?;
    let (mut header, body) = memory.split_at(REQUEST_HEADER_SIZE);
    let context_id = header.get_i32_le();
    let request_id = header.get_i32_le();
    let persistent = header.get_u8() != 0;
    let is_binary = header.get_u8() != 0;

    Ok(RendererMessage {
        context_id,
        request_id,
        persistent,
        payload: Payload::from_region(body, is_binary),
    })
}

/// A success response whose payload has already been encoded but whose
/// request identity is filled in later, when the browser side knows which
/// context and request the query belongs to.
pub enum ResponseBuilder {
    Inline {
        name: String,
        payload: Payload,
    },
    Shared {
        builder: SharedProcessMessageBuilder,
    },
}

impl ResponseBuilder {
    /// Encode `payload`, choosing shared memory at or above `threshold`
    pub fn new(threshold: usize, name: &str, payload: Payload) -> Self {
        if use_shared_memory(&payload, threshold) {
            let bytes = payload.as_bytes();
            let mut builder = SharedProcessMessageBuilder::create(name, RESPONSE_HEADER_SIZE + bytes.len());
            if builder.is_valid() {
                let mut body = &mut builder.memory()[8..];
                body.put_u8(payload.is_binary() as u8);
                body.put_slice(bytes);
                return ResponseBuilder::Shared { builder };
            }
            log::warn!("{}; sending response inline", IpcError::SharedMemoryAllocation(RESPONSE_HEADER_SIZE + bytes.len()));
        }

        ResponseBuilder::Inline {
            name: name.to_string(),
            payload,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, ResponseBuilder::Shared { .. })
    }

    /// Stamp the request identity and produce the message
    pub fn build(self, context_id: ContextId, request_id: RequestId) -> Option<ProcessMessage> {
        match self {
            ResponseBuilder::Inline { name, payload } => {
                let mut message = ProcessMessage::new(&name);
                if let Some(args) = message.argument_list_mut() {
                    args.set_int(CONTEXT_ID, context_id);
                    args.set_int(REQUEST_ID, request_id);
                    args.set_bool(IS_SUCCESS, true);
                    payload.set_inline(args, BROWSER_PAYLOAD);
                }
                Some(message)
            }
            ResponseBuilder::Shared { mut builder } => {
                let mut header = builder.memory();
                header.put_i32_le(context_id);
                header.put_i32_le(request_id);
                builder.build()
            }
        }
    }
}

/// Encode a browser → renderer success response
pub fn build_success_message(
    threshold: usize,
    name: &str,
    context_id: ContextId,
    request_id: RequestId,
    payload: Payload,
) -> Option<ProcessMessage> {
    ResponseBuilder::new(threshold, name, payload).build(context_id, request_id)
}

/// Encode a browser → renderer failure response. Never uses shared memory.
pub fn build_failure_message(
    name: &str,
    context_id: ContextId,
    request_id: RequestId,
    error_code: i32,
    error_message: &str,
) -> ProcessMessage {
    let mut message = ProcessMessage::new(name);
    if let Some(args) = message.argument_list_mut() {
        args.set_int(CONTEXT_ID, context_id);
        args.set_int(REQUEST_ID, request_id);
        args.set_bool(IS_SUCCESS, false);
        args.set_int(ERROR_CODE, error_code);
        args.set_string(ERROR_MESSAGE, error_message);
    }
    message
}

/// Decode a browser → renderer response
pub fn parse_browser_message(message: &ProcessMessage) -> Result<BrowserMessage, CodecError> {
    if let Some(args) = message.argument_list() {
        let reader = ArgReader::new(message.name(), args);
        let context_id = reader.int(CONTEXT_ID)?;
        let request_id = reader.int(REQUEST_ID)?;
        if reader.bool(IS_SUCCESS)? {
            return Ok(BrowserMessage::Success {
                context_id,
                request_id,
                payload: reader.payload(BROWSER_PAYLOAD)?,
            });
        }
        return Ok(BrowserMessage::Failure {
            context_id,
            request_id,
            error_code: reader.int(ERROR_CODE)?,
            error_message: reader.string(ERROR_MESSAGE)?,
        });
    }

    let memory = region_memory(message, RESPONSE_HEADER_SIZE)?;
    let (mut header, body) = memory.split_at(RESPONSE_HEADER_SIZE);
    let context_id = header.get_i32_le();
    let request_id = header.get_i32_le();
    let is_binary = header.get_u8() != 0;

    Ok(BrowserMessage::Success {
        context_id,
        request_id,
        payload: Payload::from_region(body, is_binary),
    })
}

/// Encode a renderer → browser cancel request. A reserved `request_id`
/// cancels every request in the context.
pub fn build_cancel_message(name: &str, context_id: ContextId, request_id: RequestId) -> ProcessMessage {
    let mut message = ProcessMessage::new(name);
    if let Some(args) = message.argument_list_mut() {
        args.set_int(CONTEXT_ID, context_id);
        args.set_int(REQUEST_ID, request_id);
    }
    message
}

/// Decode a renderer → browser cancel request
pub fn parse_cancel_message(message: &ProcessMessage) -> Result<(ContextId, RequestId), CodecError> {
    let args = message
        .argument_list()
        .ok_or_else(|| CodecError::EmptyMessage(message.name().to_string()))?;
    let reader = ArgReader::new(message.name(), args);
    Ok((reader.int(CONTEXT_ID)?, reader.int(REQUEST_ID)?))
}

fn region_memory(message: &ProcessMessage, header: usize) -> Result<&[u8], CodecError> {
    let region = message
        .shared_memory_region()
        .filter(|region| region.is_valid())
        .ok_or_else(|| CodecError::EmptyMessage(message.name().to_string()))?;
    if region.size() < header {
        return Err(CodecError::TruncatedRegion {
            size: region.size(),
            header,
        });
    }
    Ok(region.memory())
}

/// Typed access to an argument list with protocol errors on mismatch
struct ArgReader<'a> {
    name: &'a str,
    args: &'a ListValue,
}

impl<'a> ArgReader<'a> {
    fn new(name: &'a str, args: &'a ListValue) -> Self {
        Self { name, args }
    }

    fn typed(&self, index: usize, expected: ValueType) -> Result<(), CodecError> {
        let found = self.args.get_type(index).ok_or_else(|| CodecError::MissingArgument {
            name: self.name.to_string(),
            index,
        })?;
        if found != expected {
            return Err(self.mismatch(index, expected.as_str(), found));
        }
        Ok(())
    }

    fn mismatch(&self, index: usize, expected: &'static str, found: ValueType) -> CodecError {
        CodecError::UnexpectedType {
            name: self.name.to_string(),
            index,
            expected,
            found: found.as_str(),
        }
    }

    fn int(&self, index: usize) -> Result<i32, CodecError> {
        self.typed(index, ValueType::Int)?;
        Ok(self.args.get_int(index).unwrap_or_default())
    }

    fn bool(&self, index: usize) -> Result<bool, CodecError> {
        self.typed(index, ValueType::Bool)?;
        Ok(self.args.get_bool(index).unwrap_or_default())
    }

    fn string(&self, index: usize) -> Result<String, CodecError> {
        self.typed(index, ValueType::String)?;
        Ok(self.args.get_string(index).unwrap_or_default().to_string())
    }

    fn payload(&self, index: usize) -> Result<Payload, CodecError> {
        let found = self.args.get_type(index).ok_or_else(|| CodecError::MissingArgument {
            name: self.name.to_string(),
            index,
        })?;
        match found {
            ValueType::Null => Ok(Payload::Empty),
            ValueType::String => Ok(Payload::String(self.args.get_string(index).unwrap_or_default().to_string())),
            ValueType::Binary => Ok(Payload::Binary(self.args.get_binary(index).unwrap_or_default().to_vec())),
            other => Err(self.mismatch(index, "string, binary or null", other)),
        }
    }
}
