//! Shared memory backed process messages
//!
//! A [`SharedProcessMessageBuilder`] hands out a fixed-size writable buffer.
//! Once the caller has filled it, [`SharedProcessMessageBuilder::build`] seals
//! the buffer into an immutable [`SharedMemoryRegion`] carried by a
//! [`ProcessMessage`]. Readers only ever see the sealed, read-only view.

use bytes::Bytes;

use super::message::ProcessMessage;

/// A sealed, read-only shared memory region
#[derive(Debug, Clone)]
pub struct SharedMemoryRegion {
    data: Bytes,
}

impl SharedMemoryRegion {
    /// A region is valid when it maps at least one byte
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Read-only view of the mapped bytes
    pub fn memory(&self) -> &[u8] {
        &self.data
    }
}

/// Builds a process message whose body lives in shared memory
pub struct SharedProcessMessageBuilder {
    name: String,
    buffer: Option<Vec<u8>>,
}

impl SharedProcessMessageBuilder {
    /// Allocate a zeroed region of `byte_size` bytes for message `name`.
    /// If the allocation fails the builder is returned invalid.
    pub fn create(name: &str, byte_size: usize) -> Self {
        let mut buffer = Vec::new();
        let buffer = match buffer.try_reserve_exact(byte_size) {
            Ok(()) if byte_size > 0 => {
                buffer.resize(byte_size, 0);
                Some(buffer)
            }
            _ => {
                log::warn!("Failed to allocate {} bytes of shared memory for '{}'", byte_size, name);
                None
            }
        };

        Self {
            name: name.to_string(),
            buffer,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn size(&self) -> usize {
        self.buffer.as_ref().map(Vec::len).unwrap_or_default()
    }

    /// Writable view of the region; empty if the builder is invalid
    pub fn memory(&mut self) -> &mut [u8] {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Seal the region into a message. Returns `None` if the builder is invalid.
    pub fn build(self) -> Option<ProcessMessage> {
        let buffer = self.buffer?;
        let region = SharedMemoryRegion {
            data: Bytes::from(buffer),
        };
        Some(ProcessMessage::with_region(self.name, region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_round_trip() {
        let mut builder = SharedProcessMessageBuilder::create("cefQueryMsg", 4);
        assert!(builder.is_valid());
        assert_eq!(builder.size(), 4);
        builder.memory().copy_from_slice(b"abcd");

        let msg = builder.build().unwrap();
        assert_eq!(msg.name(), "cefQueryMsg");
        assert!(msg.argument_list().is_none());

        let region = msg.shared_memory_region().unwrap();
        assert!(region.is_valid());
        assert_eq!(region.memory(), b"abcd");
    }

    #[test]
    fn test_zero_sized_builder_is_invalid() {
        let mut builder = SharedProcessMessageBuilder::create("cefQueryMsg", 0);
        assert!(!builder.is_valid());
        assert!(builder.memory().is_empty());
        assert!(builder.build().is_none());
    }

    #[test]
    fn test_region_clones_share_memory() {
        let mut builder = SharedProcessMessageBuilder::create("m", 3);
        builder.memory().copy_from_slice(&[9, 8, 7]);
        let msg = builder.build().unwrap();
        let copy = msg.clone();
        assert_eq!(
            msg.shared_memory_region().unwrap().memory().as_ptr(),
            copy.shared_memory_region().unwrap().memory().as_ptr()
        );
    }
}
