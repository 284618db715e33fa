//! Browser and frame handles shared by both sides of the router

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::ProcessType;
use super::ipc::{IpcMessage, MessageSink};
use super::message::ProcessMessage;
use crate::utils::IpcError;

/// Browser identifier, stable for the life of the browser
pub type BrowserId = i32;

/// Frame identifier
pub type FrameId = i64;

/// A browser instance as seen from either process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Browser {
    id: BrowserId,
}

impl Browser {
    pub fn new(id: BrowserId) -> Self {
        Self { id }
    }

    pub fn identifier(&self) -> BrowserId {
        self.id
    }
}

struct FrameInner {
    id: FrameId,
    browser_id: BrowserId,
    is_main: bool,
    process: ProcessType,
    attached: AtomicBool,
    sink: Arc<dyn MessageSink>,
}

/// A frame within a browser. Cheap to clone; clones refer to the same frame.
///
/// Messages sent through a frame are stamped with the frame's browser and
/// frame ids so the receiving process can resolve its own handles.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// Create a frame living in `process` that sends through `sink`
    pub fn new(
        browser_id: BrowserId,
        id: FrameId,
        is_main: bool,
        process: ProcessType,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            inner: Arc::new(FrameInner {
                id,
                browser_id,
                is_main,
                process,
                attached: AtomicBool::new(true),
                sink,
            }),
        }
    }

    pub fn identifier(&self) -> FrameId {
        self.inner.id
    }

    /// Whether this is the top-level frame of its browser
    pub fn is_main(&self) -> bool {
        self.inner.is_main
    }

    /// False once the frame has been detached from its document
    pub fn is_valid(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    /// Detach the frame; later sends fail with [`IpcError::FrameDetached`]
    pub fn detach(&self) {
        self.inner.attached.store(false, Ordering::Release);
    }

    /// Send `message` to the `target` process
    pub fn send_process_message(
        &self,
        target: ProcessType,
        message: ProcessMessage,
    ) -> Result<(), IpcError> {
        if !self.is_valid() {
            return Err(IpcError::FrameDetached(self.inner.id));
        }
        let envelope = IpcMessage::new(
            self.inner.browser_id,
            self.inner.id,
            self.inner.process,
            target,
            message,
        );
        self.inner.sink.send(envelope)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.inner.id)
            .field("browser_id", &self.inner.browser_id)
            .field("is_main", &self.inner.is_main)
            .field("process", &self.inner.process)
            .field("attached", &self.is_valid())
            .finish()
    }
}
