//! Shared-memory backed device context
//!
//! `HostContext` implements the full [`DeviceContext`] contract without an
//! accelerator: every "device" allocation is a named shared memory segment,
//! so cross-process sharing works the same way it does for real device
//! memory — the exported handle carries the segment name and the importing
//! process maps the same bytes instead of copying them.

use crate::context::DeviceContext;
use crate::handle::{ShareableHandle, SHARED_HANDLE_SIZE};
use crate::shm::SharedMemory;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Device context backed by POSIX shared memory
pub struct HostContext {
    /// Prefix for segment names, unique per context
    prefix: String,
    /// Next segment id
    next_id: AtomicU64,
    /// Mapped segments, keyed by base address
    regions: Mutex<HashMap<u64, SharedMemory>>,
    /// Pinned host allocations, keyed by address
    pinned: Mutex<HashMap<usize, Box<[u8]>>>,
}

// Safety: segment base addresses are stable for the segment's lifetime and
// all registry access goes through the internal mutexes
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

impl HostContext {
    /// Create a context with a process-unique segment name prefix
    pub fn new() -> Self {
        Self::with_prefix(&format!("dmem_{}", std::process::id()))
    }

    /// Create a context with an explicit segment name prefix
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            next_id: AtomicU64::new(0),
            regions: Mutex::new(HashMap::new()),
            pinned: Mutex::new(HashMap::new()),
        }
    }

    fn segment_name(&self, id: u64) -> String {
        format!("{}_{}", self.prefix, id)
    }

    /// Check that `[ptr, ptr + len)` lies inside one mapped segment and
    /// return its base address
    fn resolve(&self, regions: &HashMap<u64, SharedMemory>, ptr: u64, len: usize) -> Result<u64> {
        for (base, shm) in regions.iter() {
            let end = *base + shm.size() as u64;
            if ptr >= *base && ptr + len as u64 <= end {
                return Ok(*base);
            }
        }
        Err(Error::SharedMemory(format!(
            "address range {:#x}+{} is not mapped",
            ptr, len
        )))
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContext for HostContext {
    fn allocate(&self, size: usize) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let shm = SharedMemory::create(&self.segment_name(id), size)?;
        let base = shm.as_ptr() as u64;
        self.regions.lock().unwrap().insert(base, shm);
        Ok(base)
    }

    fn free(&self, ptr: u64, _size: usize) -> Result<()> {
        self.regions
            .lock()
            .unwrap()
            .remove(&ptr)
            .map(|_| ())
            .ok_or_else(|| Error::SharedMemory(format!("no segment at {:#x}", ptr)))
    }

    fn copy_host_to_device(&self, dst: u64, src: &[u8]) -> Result<()> {
        let regions = self.regions.lock().unwrap();
        self.resolve(&regions, dst, src.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    fn copy_device_to_host(&self, dst: &mut [u8], src: u64) -> Result<()> {
        let regions = self.regions.lock().unwrap();
        self.resolve(&regions, src, dst.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn export_for_sharing(&self, ptr: u64) -> Result<ShareableHandle> {
        let regions = self.regions.lock().unwrap();
        let base = self.resolve(&regions, ptr, 0)?;
        let name = regions[&base].name();

        // Segment name, null-terminated, in the fixed payload
        if name.len() >= SHARED_HANDLE_SIZE {
            return Err(Error::SharedMemory(format!(
                "segment name '{}' too long for handle payload",
                name
            )));
        }
        let mut payload = [0u8; SHARED_HANDLE_SIZE];
        payload[..name.len()].copy_from_slice(name.as_bytes());
        ShareableHandle::from_bytes(&payload)
    }

    fn import_shared(&self, handle: &ShareableHandle) -> Result<u64> {
        let payload = handle.as_bytes();
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let name = std::str::from_utf8(&payload[..end])
            .map_err(|_| Error::SharedMemory("handle payload is not a segment name".to_string()))?;

        let shm = SharedMemory::open(name)?;
        let base = shm.as_ptr() as u64;
        self.regions.lock().unwrap().insert(base, shm);
        Ok(base)
    }

    fn release_shared(&self, ptr: u64) -> Result<()> {
        self.regions
            .lock()
            .unwrap()
            .remove(&ptr)
            .map(|_| ())
            .ok_or_else(|| Error::SharedMemory(format!("no imported segment at {:#x}", ptr)))
    }

    fn allocate_pinned(&self, size: usize) -> Result<*mut u8> {
        let mut block = vec![0u8; size].into_boxed_slice();
        let ptr = block.as_mut_ptr();
        self.pinned.lock().unwrap().insert(ptr as usize, block);
        Ok(ptr)
    }

    fn free_pinned(&self, ptr: *mut u8) -> Result<()> {
        self.pinned
            .lock()
            .unwrap()
            .remove(&(ptr as usize))
            .map(|_| ())
            .ok_or_else(|| Error::Transfer(format!("unknown pinned host pointer {:p}", ptr)))
    }
}
