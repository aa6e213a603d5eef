//! CPU compute backend using Rayon for shared-memory parallelism.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use stride_core::kernel::{check_shapes, multiply_rows};
use stride_core::{CoreError, Matrix, Vector};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// Build a dedicated pool so the thread count stays a property of the
/// backend rather than of the process.
pub(crate) fn build_pool(num_threads: usize) -> Result<ThreadPool, ComputeError> {
    if num_threads == 0 {
        return Err(CoreError::InvalidWorkerCount(0).into());
    }
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("stride-cpu-{i}"))
        .build()
        .map_err(|e| ComputeError::Unavailable(format!("thread pool: {e}")))
}

/// CPU backend that splits the rows across threads via Rayon.
///
/// Each task owns a disjoint chunk of the output, so no locking happens on
/// the hot path. `ThreadPool::install` returns once every chunk is written.
pub struct CpuBackend {
    num_threads: usize,
    pool: ThreadPool,
}

impl CpuBackend {
    /// Create a CPU backend using as many threads as Rayon would by default.
    pub fn new() -> Result<Self, ComputeError> {
        Self::with_threads(rayon::current_num_threads())
    }

    /// Create a CPU backend with a specified thread count.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        Ok(Self {
            num_threads,
            pool: build_pool(num_threads)?,
        })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Threads,
            workers: self.num_threads,
        }
    }

    fn matvec(&self, matrix: &Matrix, vector: &Vector) -> Result<Vector, ComputeError> {
        check_shapes(matrix, vector)?;
        let cols = matrix.cols();
        let x = vector.as_slice();
        let mut out = Vector::zeros(matrix.rows())?.into_vec();

        // A few chunks per thread keeps the load even without per-row tasks.
        let rows_per_task = matrix.rows().div_ceil(self.num_threads * 4).max(1);

        self.pool.install(|| {
            out.par_chunks_mut(rows_per_task)
                .zip(matrix.as_slice().par_chunks(rows_per_task * cols))
                .try_for_each(|(chunk, block)| multiply_rows(block, cols, x, chunk))
        })?;

        Ok(Vector::new(out)?)
    }
}
