//! Sequential reader over a device buffer

use crate::buffer::DeviceBuffer;
use crate::{Error, Result};
use std::sync::Arc;

/// Read cursor over a [`DeviceBuffer`].
///
/// Reads clamp to the remaining length: a short read at end-of-buffer is a
/// success, not an error. The zero-copy variant hands out non-owning slices
/// of the underlying buffer instead of copying to host memory.
pub struct DeviceBufferReader {
    buffer: Arc<DeviceBuffer>,
    position: usize,
}

impl DeviceBufferReader {
    pub fn new(buffer: Arc<DeviceBuffer>) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Copy up to `out.len()` device bytes to host memory, returning the
    /// number of bytes actually read
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<usize> {
        let nbytes = out.len().min(self.remaining());
        self.buffer
            .copy_to_host(self.position, &mut out[..nbytes])?;
        self.position += nbytes;
        Ok(nbytes)
    }

    /// Zero-copy read: return a non-owning slice covering the next `nbytes`
    /// (clamped to the remaining length) and advance the cursor
    pub fn read_slice(&mut self, nbytes: usize) -> Result<Arc<DeviceBuffer>> {
        let nbytes = nbytes.min(self.remaining());
        let out = self.buffer.slice(self.position, nbytes)?;
        self.position += nbytes;
        Ok(out)
    }

    /// Absolute seek within `[0, len]`
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.buffer.len() {
            return Err(Error::OutOfBounds {
                position,
                length: self.buffer.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}
