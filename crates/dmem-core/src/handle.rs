//! Shareable handle for cross-process buffer import

use crate::{Error, Result};

/// Size of the opaque handle payload (matches the CUDA IPC handle width)
pub const SHARED_HANDLE_SIZE: usize = 64;

/// Opaque, fixed-size token identifying a device memory region.
///
/// A handle is produced by [`DeviceBuffer::export_for_sharing`] and consumed
/// by [`DeviceBuffer::from_handle`] in another process. The payload carries no
/// structure at this layer; validity is only determined when a context
/// attempts to import it.
///
/// [`DeviceBuffer::export_for_sharing`]: crate::DeviceBuffer::export_for_sharing
/// [`DeviceBuffer::from_handle`]: crate::DeviceBuffer::from_handle
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShareableHandle {
    bytes: [u8; SHARED_HANDLE_SIZE],
}

impl Default for ShareableHandle {
    fn default() -> Self {
        Self {
            bytes: [0u8; SHARED_HANDLE_SIZE],
        }
    }
}

impl ShareableHandle {
    /// Construct a handle from an opaque payload received out-of-band
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SHARED_HANDLE_SIZE {
            return Err(Error::HandleSize {
                expected: SHARED_HANDLE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut payload = [0u8; SHARED_HANDLE_SIZE];
        payload.copy_from_slice(bytes);
        Ok(Self { bytes: payload })
    }

    /// Serialize the payload for transport over an arbitrary byte channel
    pub fn serialize(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Get the raw payload
    pub fn as_bytes(&self) -> &[u8; SHARED_HANDLE_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for ShareableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ShareableHandle(")?;
        for b in &self.bytes[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..)")
    }
}
