//! Sequential writer with optional host-side staging

use crate::buffer::DeviceBuffer;
use crate::pinned::PinnedHostBuffer;
use crate::{Error, Result};
use std::sync::{Arc, Mutex};

struct WriterInner {
    /// Logical write cursor; staged bytes end here
    position: usize,
    /// Pinned staging area, present in buffered mode
    stage: Option<PinnedHostBuffer>,
    stage_capacity: usize,
    /// Bytes currently staged and not yet on the device
    staged: usize,
}

/// Write cursor over a [`DeviceBuffer`].
///
/// Starts in unbuffered mode, where every [`write`](Self::write) is one
/// host→device transfer. [`set_buffer_size`](Self::set_buffer_size) switches
/// to buffered mode: small writes accumulate in a pinned staging buffer and
/// reach the device in fewer, larger transfers.
///
/// Only [`write_at`](Self::write_at) is an atomic composite — it holds the
/// internal lock across its seek and write. Plain `write`/`seek`/`flush`
/// calls from multiple threads do not interleave within a call, but carry no
/// cross-call ordering guarantee; sequencing those is the caller's job.
pub struct DeviceBufferWriter {
    buffer: Arc<DeviceBuffer>,
    inner: Mutex<WriterInner>,
}

impl DeviceBufferWriter {
    pub fn new(buffer: Arc<DeviceBuffer>) -> Self {
        assert!(buffer.is_mutable(), "writer requires a mutable buffer");
        Self {
            buffer,
            inner: Mutex::new(WriterInner {
                position: 0,
                stage: None,
                stage_capacity: 0,
                staged: 0,
            }),
        }
    }

    fn flush_locked(&self, inner: &mut WriterInner) -> Result<()> {
        if inner.staged == 0 {
            return Ok(());
        }
        if let Some(stage) = &inner.stage {
            // Staged window ends at the cursor
            let start = inner.position - inner.staged;
            self.buffer.context().copy_host_to_device(
                self.buffer.address() + start as u64,
                &stage.as_slice()[..inner.staged],
            )?;
        }
        inner.staged = 0;
        Ok(())
    }

    fn seek_locked(&self, inner: &mut WriterInner, position: usize) -> Result<()> {
        // Staged bytes belong to the pre-seek cursor; commit them first
        self.flush_locked(inner)?;
        if position >= self.buffer.len() {
            return Err(Error::OutOfBounds {
                position,
                length: self.buffer.len(),
            });
        }
        inner.position = position;
        Ok(())
    }

    fn write_locked(&self, inner: &mut WriterInner, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if inner.stage_capacity > 0 {
            if inner.staged + data.len() >= inner.stage_capacity {
                // Would fill the stage: commit the staged window, then send
                // the new bytes straight to the device
                self.flush_locked(inner)?;
                self.buffer.context().copy_host_to_device(
                    self.buffer.address() + inner.position as u64,
                    data,
                )?;
            } else {
                if let Some(stage) = &mut inner.stage {
                    stage.as_mut_slice()[inner.staged..inner.staged + data.len()]
                        .copy_from_slice(data);
                }
                inner.staged += data.len();
            }
        } else {
            self.buffer.context().copy_host_to_device(
                self.buffer.address() + inner.position as u64,
                data,
            )?;
        }
        inner.position += data.len();
        Ok(())
    }

    /// Write `data` at the current cursor and advance by its length
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.write_locked(&mut inner, data)
    }

    /// Seek then write, as one atomic operation
    pub fn write_at(&self, position: usize, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.seek_locked(&mut inner, position)?;
        self.write_locked(&mut inner, data)
    }

    /// Absolute seek within `[0, len)`, flushing any staged bytes first
    pub fn seek(&self, position: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.seek_locked(&mut inner, position)
    }

    /// Commit any staged bytes to the device
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.flush_locked(&mut inner)
    }

    /// Switch to buffered mode with a staging buffer of `capacity` bytes,
    /// or back to unbuffered mode with `capacity = 0`.
    ///
    /// Any staged bytes are flushed before the stage is replaced.
    pub fn set_buffer_size(&self, capacity: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.flush_locked(&mut inner)?;
        inner.stage = if capacity > 0 {
            Some(PinnedHostBuffer::new(self.buffer.context().clone(), capacity)?)
        } else {
            None
        };
        inner.stage_capacity = capacity;
        Ok(())
    }

    /// Flush and discard the writer's staged state; the buffer itself stays
    /// usable
    pub fn close(&self) -> Result<()> {
        self.flush()
    }

    /// Logical write position (includes staged, unflushed bytes)
    pub fn position(&self) -> usize {
        self.inner.lock().unwrap().position
    }

    /// Staging capacity; zero in unbuffered mode
    pub fn buffer_capacity(&self) -> usize {
        self.inner.lock().unwrap().stage_capacity
    }

    /// Bytes staged but not yet committed to the device
    pub fn bytes_staged(&self) -> usize {
        self.inner.lock().unwrap().staged
    }
}

impl Drop for DeviceBufferWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!("failed to flush staged writes: {}", e);
        }
    }
}
