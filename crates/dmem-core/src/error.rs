//! Error types for dmem

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("buffer has already been exported for sharing")]
    AlreadyExported,

    #[error("sliced buffer cannot be exported for sharing")]
    SliceNotExportable,

    #[error("position {position} out of bounds for length {length}")]
    OutOfBounds { position: usize, length: usize },

    #[error("handle payload must be {expected} bytes, got {actual}")]
    HandleSize { expected: usize, actual: usize },

    #[error("shared memory error: {0}")]
    SharedMemory(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(String),
}

pub type Result<T> = std::result::Result<T, Error>;
