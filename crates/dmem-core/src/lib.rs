//! dmem - Device-memory buffer management
//!
//! Allocate, slice, copy and stream-write accelerator memory through uniform
//! buffer abstractions, and share regions across processes via opaque
//! fixed-size handles. All raw driver work goes through the
//! [`DeviceContext`] trait; [`HostContext`] is a shared-memory backed
//! implementation usable without an accelerator, and the `cuda` feature adds
//! a CUDA driver backend.

pub mod buffer;
pub mod context;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod error;
pub mod handle;
pub mod host;
pub mod pinned;
pub mod reader;
pub mod shm;
pub mod writer;

pub use buffer::DeviceBuffer;
pub use context::DeviceContext;
#[cfg(feature = "cuda")]
pub use cuda::{CudaContext, DeviceManager};
pub use error::{Error, Result};
pub use handle::{ShareableHandle, SHARED_HANDLE_SIZE};
pub use host::HostContext;
pub use pinned::PinnedHostBuffer;
pub use reader::DeviceBufferReader;
pub use writer::DeviceBufferWriter;
