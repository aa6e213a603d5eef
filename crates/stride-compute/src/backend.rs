//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution strategies
//! (sequential, shared-memory threads, tiled, distributed) so that callers
//! pick a strategy at run time and get the same result from every one.

use stride_core::{CoreError, Matrix, Vector};
use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Backend not available: {0}")]
    Unavailable(String),

    #[error("Worker {rank} failed: {reason}")]
    WorkerFailed { rank: usize, reason: String },

    #[error("Run aborted: {0}")]
    Aborted(String),
}

/// Describes a configured backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    /// Threads or processes taking part in a run.
    pub workers: usize,
}

/// The execution strategy of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sequential,
    Threads,
    Tiled,
    Distributed,
    Mpi,
}

impl BackendType {
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Sequential => "sequential",
            BackendType::Threads => "threads",
            BackendType::Tiled => "tiled",
            BackendType::Distributed => "distributed",
            BackendType::Mpi => "mpi",
        }
    }
}

/// Abstraction over matrix-vector execution strategies.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the backend.
    fn device_info(&self) -> DeviceInfo;

    /// Compute `matrix * vector`.
    ///
    /// Every implementation returns a result bit-identical to
    /// [`stride_core::kernel::multiply`].
    fn matvec(&self, matrix: &Matrix, vector: &Vector) -> Result<Vector, ComputeError>;
}

/// Single-threaded backend; the reference every other backend must match.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialBackend;

impl ComputeBackend for SequentialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Sequential".into(),
            backend_type: BackendType::Sequential,
            workers: 1,
        }
    }

    fn matvec(&self, matrix: &Matrix, vector: &Vector) -> Result<Vector, ComputeError> {
        Ok(stride_core::kernel::multiply(matrix, vector)?)
    }
}
