//! Pinned host buffer

use crate::context::DeviceContext;
use crate::Result;
use std::sync::Arc;

/// Host memory allocated through the device-aware allocator.
///
/// Pinned allocations can serve directly as the source or destination of
/// host↔device copies. Freed exactly once, on drop, through the context
/// that allocated it.
pub struct PinnedHostBuffer {
    context: Arc<dyn DeviceContext>,
    ptr: *mut u8,
    size: usize,
}

// Safety: the allocation is exclusively owned by this value and only freed
// on drop; the context is Send + Sync by trait bound
unsafe impl Send for PinnedHostBuffer {}
unsafe impl Sync for PinnedHostBuffer {}

impl PinnedHostBuffer {
    /// Allocate `size` bytes of pinned host memory
    pub fn new(context: Arc<dyn DeviceContext>, size: usize) -> Result<Self> {
        let ptr = context.allocate_pinned(size)?;
        Ok(Self { context, ptr, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }
}

impl Drop for PinnedHostBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.context.free_pinned(self.ptr) {
            tracing::error!("failed to free pinned host buffer: {}", e);
        }
    }
}
