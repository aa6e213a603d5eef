use thiserror::Error;

use stride_core::CoreError;

/// Errors while reading, writing, or processing images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Failed to access file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not a bitmap file (signature 0x{0:04X})")]
    InvalidSignature(u16),

    #[error("Unsupported bitmap: {0}")]
    Unsupported(String),

    #[error("Bitmap truncated: need {needed} bytes, file has {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Invalid image dimensions {width}x{height} with {channels} channels")]
    InvalidDimensions {
        width: usize,
        height: usize,
        channels: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Worker {rank} failed: {reason}")]
    WorkerFailed { rank: usize, reason: String },

    #[error(transparent)]
    Partition(#[from] CoreError),
}
