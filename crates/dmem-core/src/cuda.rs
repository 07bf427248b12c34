//! CUDA device context and process-wide device manager

use crate::context::DeviceContext;
use crate::handle::{ShareableHandle, SHARED_HANDLE_SIZE};
use crate::{Error, Result};
use cudarc::driver::sys;
use cudarc::driver::{CudaDevice, CudaSlice, DevicePtr};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

fn check(result: sys::CUresult, call: &str) -> Result<()> {
    if result != sys::CUresult::CUDA_SUCCESS {
        return Err(Error::Cuda(format!("{} failed: {:?}", call, result)));
    }
    Ok(())
}

/// Device context backed by the CUDA driver API
pub struct CudaContext {
    device: Arc<CudaDevice>,
    device_id: i32,
}

impl CudaContext {
    /// Bind to the given CUDA device
    pub fn new(device_id: i32) -> Result<Self> {
        let device =
            CudaDevice::new(device_id as usize).map_err(|e| Error::Cuda(e.to_string()))?;
        Ok(Self { device, device_id })
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }
}

impl DeviceContext for CudaContext {
    fn allocate(&self, size: usize) -> Result<u64> {
        let slice: CudaSlice<u8> = self
            .device
            .alloc_zeros(size)
            .map_err(|e| Error::Cuda(e.to_string()))?;
        let ptr = *slice.device_ptr() as u64;
        // The buffer layer frees through `free`; drop must not run here
        std::mem::forget(slice);
        Ok(ptr)
    }

    fn free(&self, ptr: u64, _size: usize) -> Result<()> {
        unsafe { check(sys::cuMemFree_v2(ptr), "cuMemFree") }
    }

    fn copy_host_to_device(&self, dst: u64, src: &[u8]) -> Result<()> {
        unsafe {
            check(
                sys::cuMemcpyHtoD_v2(dst, src.as_ptr() as *const _, src.len()),
                "cuMemcpyHtoD",
            )
        }
    }

    fn copy_device_to_host(&self, dst: &mut [u8], src: u64) -> Result<()> {
        unsafe {
            check(
                sys::cuMemcpyDtoH_v2(dst.as_mut_ptr() as *mut _, src, dst.len()),
                "cuMemcpyDtoH",
            )
        }
    }

    fn export_for_sharing(&self, ptr: u64) -> Result<ShareableHandle> {
        let mut payload = [0u8; SHARED_HANDLE_SIZE];
        unsafe {
            check(
                sys::cuIpcGetMemHandle(payload.as_mut_ptr() as *mut _, ptr),
                "cuIpcGetMemHandle",
            )?;
        }
        ShareableHandle::from_bytes(&payload)
    }

    fn import_shared(&self, handle: &ShareableHandle) -> Result<u64> {
        let mut ptr: u64 = 0;
        unsafe {
            check(
                sys::cuIpcOpenMemHandle(
                    &mut ptr as *mut u64 as *mut _,
                    *(handle.as_bytes().as_ptr() as *const _),
                    sys::CUipcMem_flags::CU_IPC_MEM_LAZY_ENABLE_PEER_ACCESS,
                ),
                "cuIpcOpenMemHandle",
            )?;
        }
        Ok(ptr)
    }

    fn release_shared(&self, ptr: u64) -> Result<()> {
        unsafe { check(sys::cuIpcCloseMemHandle(ptr), "cuIpcCloseMemHandle") }
    }

    fn allocate_pinned(&self, size: usize) -> Result<*mut u8> {
        let mut ptr: *mut std::ffi::c_void = std::ptr::null_mut();
        unsafe {
            check(sys::cuMemAllocHost_v2(&mut ptr, size), "cuMemAllocHost")?;
        }
        Ok(ptr as *mut u8)
    }

    fn free_pinned(&self, ptr: *mut u8) -> Result<()> {
        unsafe { check(sys::cuMemFreeHost(ptr as *mut _), "cuMemFreeHost") }
    }
}

static INSTANCE: OnceLock<DeviceManager> = OnceLock::new();

/// Process-wide registry of CUDA contexts, one per device.
///
/// Lazily initialized on first use and live until process exit; safe to
/// reach from any thread.
pub struct DeviceManager {
    contexts: Mutex<HashMap<i32, Arc<CudaContext>>>,
}

impl DeviceManager {
    pub fn instance() -> &'static DeviceManager {
        INSTANCE.get_or_init(|| DeviceManager {
            contexts: Mutex::new(HashMap::new()),
        })
    }

    /// Get or create the context bound to `device_id`
    pub fn context(&self, device_id: i32) -> Result<Arc<CudaContext>> {
        let mut contexts = self.contexts.lock().unwrap();
        if let Some(ctx) = contexts.get(&device_id) {
            return Ok(ctx.clone());
        }
        let ctx = Arc::new(CudaContext::new(device_id)?);
        contexts.insert(device_id, ctx.clone());
        Ok(ctx)
    }
}
