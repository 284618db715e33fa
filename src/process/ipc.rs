//! Inter-process communication

use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use super::ProcessType;
use super::browser::{BrowserId, FrameId};
use super::message::ProcessMessage;
use crate::utils::IpcError;

/// Envelope carried by an IPC channel
#[derive(Debug, Clone)]
pub struct IpcMessage {
    pub browser_id: BrowserId,
    pub frame_id: FrameId,
    pub source_process: ProcessType,
    pub target_process: ProcessType,
    pub message: ProcessMessage,
    pub sequence_id: u64,
}

impl IpcMessage {
    /// Create a new IPC message
    pub fn new(
        browser_id: BrowserId,
        frame_id: FrameId,
        source: ProcessType,
        target: ProcessType,
        message: ProcessMessage,
    ) -> Self {
        static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        Self {
            browser_id,
            frame_id,
            source_process: source,
            target_process: target,
            message,
            sequence_id: COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst),
        }
    }
}

/// Anything that can carry an [`IpcMessage`] to another process
pub trait MessageSink: Send + Sync {
    fn send(&self, message: IpcMessage) -> Result<(), IpcError>;
}

/// IPC channel for communication between processes
pub struct IpcChannel {
    process: ProcessType,
    peer: ProcessType,
    sender: Sender<IpcMessage>,
    receiver: Arc<Mutex<Receiver<IpcMessage>>>,
}

impl IpcChannel {
    /// Create a connected channel pair. Messages sent on the first end are
    /// received by the second and vice versa.
    pub fn pair(first: ProcessType, second: ProcessType) -> (Self, Self) {
        let (tx1, rx1) = channel();
        let (tx2, rx2) = channel();

        let channel1 = Self {
            process: first,
            peer: second,
            sender: tx2,
            receiver: Arc::new(Mutex::new(rx1)),
        };

        let channel2 = Self {
            process: second,
            peer: first,
            sender: tx1,
            receiver: Arc::new(Mutex::new(rx2)),
        };

        (channel1, channel2)
    }

    /// Receive a message (blocking)
    pub fn recv(&self) -> Result<IpcMessage, IpcError> {
        self.receiver
            .lock()
            .map_err(|_| IpcError::ChannelClosed(self.peer.as_str()))?
            .recv()
            .map_err(|_| IpcError::ChannelClosed(self.peer.as_str()))
    }

    /// Try to receive a message (non-blocking)
    pub fn try_recv(&self) -> Option<IpcMessage> {
        self.receiver.lock().ok()?.try_recv().ok()
    }

    /// Drain every message currently queued
    pub fn drain(&self) -> Vec<IpcMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// The process owning this end
    pub fn process(&self) -> ProcessType {
        self.process
    }
}

impl MessageSink for IpcChannel {
    fn send(&self, message: IpcMessage) -> Result<(), IpcError> {
        self.sender
            .send(message)
            .map_err(|_| IpcError::ChannelClosed(self.peer.as_str()))
    }
}
