//! Device context collaborator boundary

use crate::handle::ShareableHandle;
use crate::Result;

/// Operations a device backend must provide.
///
/// A context is bound to one accelerator device (or the host fallback) and
/// performs all raw allocation, copy and sharing work on behalf of
/// [`DeviceBuffer`](crate::DeviceBuffer) and the stream types. Device
/// addresses are opaque `u64` values; copy destinations/sources already
/// include any offset the caller applied.
///
/// All operations block until the transfer is logically complete and report
/// failures without retrying.
pub trait DeviceContext: Send + Sync {
    /// Allocate `size` bytes of device memory
    fn allocate(&self, size: usize) -> Result<u64>;

    /// Free device memory previously returned by [`allocate`](Self::allocate)
    fn free(&self, ptr: u64, size: usize) -> Result<()>;

    /// Copy `src` to device memory at `dst`
    fn copy_host_to_device(&self, dst: u64, src: &[u8]) -> Result<()>;

    /// Copy `dst.len()` bytes of device memory at `src` into `dst`
    fn copy_device_to_host(&self, dst: &mut [u8], src: u64) -> Result<()>;

    /// Export the region at `ptr` as an opaque cross-process handle
    fn export_for_sharing(&self, ptr: u64) -> Result<ShareableHandle>;

    /// Import a region exported by another process
    fn import_shared(&self, handle: &ShareableHandle) -> Result<u64>;

    /// Tear down a mapping created by [`import_shared`](Self::import_shared)
    fn release_shared(&self, ptr: u64) -> Result<()>;

    /// Allocate pinned host memory usable for staged transfers
    fn allocate_pinned(&self, size: usize) -> Result<*mut u8>;

    /// Free pinned host memory
    fn free_pinned(&self, ptr: *mut u8) -> Result<()>;
}
