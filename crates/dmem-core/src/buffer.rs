//! Device buffer ownership and copies

use crate::context::DeviceContext;
use crate::handle::ShareableHandle;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An owned or borrowed region of device memory.
///
/// Buffers come in three flavors:
/// - owning, from [`DeviceBuffer::allocate`] — frees the region on drop
/// - owning shared-import, from [`DeviceBuffer::from_handle`] — tears the
///   imported mapping down on drop instead of freeing
/// - non-owning slice, from [`DeviceBuffer::slice`] — retains its parent so
///   the parent's memory outlives every view, and releases nothing itself
///
/// A buffer exported through [`DeviceBuffer::export_for_sharing`] hands
/// ownership of its region to the sharing mechanism: it stops freeing on
/// drop and refuses a second export.
pub struct DeviceBuffer {
    context: Arc<dyn DeviceContext>,
    ptr: u64,
    size: usize,
    owns_memory: AtomicBool,
    is_shared: AtomicBool,
    mutable: bool,
    parent: Option<Arc<DeviceBuffer>>,
}

impl DeviceBuffer {
    /// Allocate a new owning device buffer of `size` bytes
    pub fn allocate(context: Arc<dyn DeviceContext>, size: usize) -> Result<Arc<Self>> {
        let ptr = context.allocate(size)?;
        Ok(Arc::new(Self {
            context,
            ptr,
            size,
            owns_memory: AtomicBool::new(true),
            is_shared: AtomicBool::new(false),
            mutable: true,
            parent: None,
        }))
    }

    /// Import a buffer exported by another process.
    ///
    /// The handle does not carry the region length; the exporting side must
    /// communicate `size` out-of-band alongside the serialized handle.
    pub fn from_handle(
        context: Arc<dyn DeviceContext>,
        handle: &ShareableHandle,
        size: usize,
    ) -> Result<Arc<Self>> {
        let ptr = context.import_shared(handle)?;
        Ok(Arc::new(Self {
            context,
            ptr,
            size,
            owns_memory: AtomicBool::new(true),
            is_shared: AtomicBool::new(true),
            mutable: true,
            parent: None,
        }))
    }

    /// Return a non-owning view of `[offset, offset + size)`.
    ///
    /// The view retains the parent, so the parent's memory stays valid for
    /// the lifetime of the longest holder.
    pub fn slice(self: &Arc<Self>, offset: usize, size: usize) -> Result<Arc<Self>> {
        if offset + size > self.size {
            return Err(Error::OutOfBounds {
                position: offset + size,
                length: self.size,
            });
        }
        Ok(Arc::new(Self {
            context: self.context.clone(),
            ptr: self.ptr + offset as u64,
            size,
            owns_memory: AtomicBool::new(false),
            is_shared: AtomicBool::new(false),
            mutable: self.mutable,
            parent: Some(self.clone()),
        }))
    }

    /// Copy `out.len()` bytes starting at `offset` into host memory.
    ///
    /// Keeping `offset + out.len()` within the buffer is the caller's
    /// responsibility.
    pub fn copy_to_host(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        debug_assert!(offset + out.len() <= self.size);
        self.context
            .copy_device_to_host(out, self.ptr + offset as u64)
    }

    /// Copy host bytes into the buffer starting at `offset`
    pub fn copy_from_host(&self, offset: usize, data: &[u8]) -> Result<()> {
        assert!(
            data.len() <= self.size - offset,
            "copy would overflow device buffer"
        );
        self.context
            .copy_host_to_device(self.ptr + offset as u64, data)
    }

    /// Export this buffer for cross-process sharing.
    ///
    /// A buffer may be exported at most once; on success, ownership of the
    /// region passes to the sharing mechanism and this buffer no longer
    /// frees it. Slices cannot be exported.
    pub fn export_for_sharing(&self) -> Result<ShareableHandle> {
        if self.parent.is_some() {
            return Err(Error::SliceNotExportable);
        }
        if self
            .is_shared
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyExported);
        }
        match self.context.export_for_sharing(self.ptr) {
            Ok(handle) => {
                self.owns_memory.store(false, Ordering::SeqCst);
                Ok(handle)
            }
            Err(e) => {
                self.is_shared.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Device address of the first byte
    pub fn address(&self) -> u64 {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn owns_memory(&self) -> bool {
        self.owns_memory.load(Ordering::SeqCst)
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &Arc<dyn DeviceContext> {
        &self.context
    }

    fn release(&self) -> Result<()> {
        if self.owns_memory.load(Ordering::SeqCst) {
            if self.is_shared.load(Ordering::SeqCst) {
                self.context.release_shared(self.ptr)
            } else {
                self.context.free(self.ptr, self.size)
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        // Teardown is best-effort: surface the failure, keep unwinding
        if let Err(e) = self.release() {
            tracing::error!("failed to release device buffer at {:#x}: {}", self.ptr, e);
        }
    }
}
