//! Tiled CPU backend.
//!
//! Row tiles are distributed across the Rayon pool; inside a row tile the
//! column tiles run in ascending order on one thread. No two threads ever
//! touch the same output cell, so unlike a collapsed row/column loop there is
//! no atomic accumulation and the per-row summation order is fixed.

use rayon::prelude::*;
use rayon::ThreadPool;
use stride_core::kernel::{check_shapes, multiply_tiled};
use stride_core::{CoreError, Matrix, Vector};

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};
use crate::cpu::build_pool;

/// Default tile edge, in elements.
pub const DEFAULT_TILE_SIZE: usize = 64;

pub struct TiledBackend {
    tile_size: usize,
    num_threads: usize,
    pool: ThreadPool,
}

impl TiledBackend {
    pub fn new(tile_size: usize, num_threads: usize) -> Result<Self, ComputeError> {
        if tile_size == 0 {
            return Err(CoreError::InvalidTileSize.into());
        }
        Ok(Self {
            tile_size,
            num_threads,
            pool: build_pool(num_threads)?,
        })
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }
}

impl ComputeBackend for TiledBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!(
                "Tiled CPU ({} threads, {}x{} tiles)",
                self.num_threads, self.tile_size, self.tile_size
            ),
            backend_type: BackendType::Tiled,
            workers: self.num_threads,
        }
    }

    fn matvec(&self, matrix: &Matrix, vector: &Vector) -> Result<Vector, ComputeError> {
        check_shapes(matrix, vector)?;
        let cols = matrix.cols();
        let tile = self.tile_size;
        let x = vector.as_slice();
        let mut out = Vector::zeros(matrix.rows())?.into_vec();

        self.pool.install(|| {
            out.par_chunks_mut(tile)
                .zip(matrix.as_slice().par_chunks(tile * cols))
                .try_for_each(|(band, block)| multiply_tiled(block, cols, x, band, tile))
        })?;

        Ok(Vector::new(out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::generate::{generate_matrix, generate_vector};
    use stride_core::kernel::multiply;

    #[test]
    fn test_identity_with_tile_two() {
        let backend = TiledBackend::new(2, 2).unwrap();
        let a = Matrix::identity(4).unwrap();
        let v = Vector::new(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(backend.matvec(&a, &v).unwrap().as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_clipped_edge_tiles() {
        // 10x7 with tile 4 leaves partial tiles on both axes.
        let a = generate_matrix(10, 7, 3).unwrap();
        let v = generate_vector(7, 4).unwrap();
        let backend = TiledBackend::new(4, 3).unwrap();
        assert_eq!(backend.matvec(&a, &v).unwrap(), multiply(&a, &v).unwrap());
    }

    #[test]
    fn test_zero_tile_rejected() {
        assert!(matches!(
            TiledBackend::new(0, 2),
            Err(ComputeError::Core(CoreError::InvalidTileSize))
        ));
    }
}
