//! Row-block matrix-vector kernels.
//!
//! Both kernels operate on a contiguous block of rows (the whole matrix, or
//! the slice a worker received) and write only into the caller's output
//! buffer. Each output cell is accumulated from `0.0` in ascending column
//! order with plain `f64` arithmetic, so the tiled kernel, the untiled kernel
//! and any row partitioning of either produce bit-identical results.

use crate::error::CoreError;
use crate::types::{Matrix, Vector};

fn check_block(block: &[f64], cols: usize, vector: &[f64], out: &[f64]) -> Result<(), CoreError> {
    if cols == 0 {
        return Err(CoreError::InvalidDimensions {
            rows: out.len(),
            cols,
        });
    }
    if vector.len() != cols {
        return Err(CoreError::ShapeMismatch {
            what: "vector length",
            expected: cols,
            actual: vector.len(),
        });
    }
    if block.len() != out.len() * cols {
        return Err(CoreError::ShapeMismatch {
            what: "row block",
            expected: out.len() * cols,
            actual: block.len(),
        });
    }
    Ok(())
}

/// `out[i] = sum_j block[i * cols + j] * vector[j]` for every row in `block`.
///
/// An empty block with an empty `out` is a valid no-op.
pub fn multiply_rows(
    block: &[f64],
    cols: usize,
    vector: &[f64],
    out: &mut [f64],
) -> Result<(), CoreError> {
    check_block(block, cols, vector, out)?;
    for (row, cell) in block.chunks_exact(cols).zip(out.iter_mut()) {
        let mut acc = 0.0;
        for (a, x) in row.iter().zip(vector) {
            acc += a * x;
        }
        *cell = acc;
    }
    Ok(())
}

/// Same product as [`multiply_rows`], visiting the block in `tile x tile`
/// sub-blocks. Edge tiles are clipped to the block bounds.
pub fn multiply_tiled(
    block: &[f64],
    cols: usize,
    vector: &[f64],
    out: &mut [f64],
    tile: usize,
) -> Result<(), CoreError> {
    if tile == 0 {
        return Err(CoreError::InvalidTileSize);
    }
    check_block(block, cols, vector, out)?;

    out.fill(0.0);
    let rows = out.len();
    for row_start in (0..rows).step_by(tile) {
        let row_end = (row_start + tile).min(rows);
        // Column tiles in ascending order keep the per-row summation order.
        for col_start in (0..cols).step_by(tile) {
            let col_end = (col_start + tile).min(cols);
            let x = &vector[col_start..col_end];
            for i in row_start..row_end {
                let base = i * cols;
                let mut acc = out[i];
                for (a, xj) in block[base + col_start..base + col_end].iter().zip(x) {
                    acc += a * xj;
                }
                out[i] = acc;
            }
        }
    }
    Ok(())
}

/// Check that a matrix and vector can be multiplied.
pub fn check_shapes(matrix: &Matrix, vector: &Vector) -> Result<(), CoreError> {
    if matrix.cols() != vector.len() {
        return Err(CoreError::ShapeMismatch {
            what: "vector length",
            expected: matrix.cols(),
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Rows and columns must both be multiples of `tile` (distributed tiled mode).
pub fn check_tile_divisible(rows: usize, cols: usize, tile: usize) -> Result<(), CoreError> {
    if tile == 0 {
        return Err(CoreError::InvalidTileSize);
    }
    if rows % tile != 0 || cols % tile != 0 {
        return Err(CoreError::TileMismatch { rows, cols, tile });
    }
    Ok(())
}

/// Sequential reference product `A * v`.
pub fn multiply(matrix: &Matrix, vector: &Vector) -> Result<Vector, CoreError> {
    check_shapes(matrix, vector)?;
    let mut out = Vector::zeros(matrix.rows())?.into_vec();
    multiply_rows(matrix.as_slice(), matrix.cols(), vector.as_slice(), &mut out)?;
    Vector::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{generate_matrix, generate_vector};
    use approx::assert_relative_eq;

    #[test]
    fn test_small_product() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        let v = Vector::new(vec![1.0, 1.0]).unwrap();
        assert_eq!(multiply(&a, &v).unwrap().as_slice(), &[3.0, 7.0, 11.0]);
    }

    #[test]
    fn test_matches_ndarray_dot() {
        let a = generate_matrix(6, 5, 1).unwrap();
        let v = generate_vector(5, 2).unwrap();
        let reference = a.view().unwrap().dot(&v.view());
        let product = multiply(&a, &v).unwrap();
        assert_eq!(product.len(), reference.len());
        for (x, y) in product.as_slice().iter().zip(reference.iter()) {
            assert_relative_eq!(*x, *y, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_tiled_identity() {
        let a = Matrix::identity(4).unwrap();
        let v = [1.0, 2.0, 3.0, 4.0];
        let mut out = [f64::NAN; 4];
        multiply_tiled(a.as_slice(), 4, &v, &mut out, 2).unwrap();
        assert_eq!(out, v);
    }

    #[test]
    fn test_tiled_matches_untiled_bitwise() {
        let a = generate_matrix(13, 11, 5).unwrap();
        let v = generate_vector(11, 6).unwrap();
        let mut expected = vec![0.0; 13];
        multiply_rows(a.as_slice(), 11, v.as_slice(), &mut expected).unwrap();

        for tile in [1, 2, 3, 4, 5, 11, 13, 64] {
            let mut out = vec![0.0; 13];
            multiply_tiled(a.as_slice(), 11, v.as_slice(), &mut out, tile).unwrap();
            let same = out
                .iter()
                .zip(&expected)
                .all(|(x, y)| x.to_bits() == y.to_bits());
            assert!(same, "tile {tile} diverged");
        }
    }

    #[test]
    fn test_empty_block_is_noop() {
        let mut out: [f64; 0] = [];
        multiply_rows(&[], 3, &[1.0, 2.0, 3.0], &mut out).unwrap();
        multiply_tiled(&[], 3, &[1.0, 2.0, 3.0], &mut out, 2).unwrap();
    }

    #[test]
    fn test_shape_errors() {
        let mut out = [0.0; 2];
        assert!(matches!(
            multiply_rows(&[1.0; 4], 2, &[1.0; 3], &mut out),
            Err(CoreError::ShapeMismatch { what: "vector length", .. })
        ));
        assert!(matches!(
            multiply_rows(&[1.0; 5], 2, &[1.0; 2], &mut out),
            Err(CoreError::ShapeMismatch { what: "row block", .. })
        ));
        assert_eq!(
            multiply_tiled(&[1.0; 4], 2, &[1.0; 2], &mut out, 0),
            Err(CoreError::InvalidTileSize)
        );
    }

    #[test]
    fn test_tile_divisibility() {
        assert!(check_tile_divisible(8, 4, 2).is_ok());
        assert_eq!(
            check_tile_divisible(8, 6, 4),
            Err(CoreError::TileMismatch { rows: 8, cols: 6, tile: 4 })
        );
        assert_eq!(check_tile_divisible(8, 8, 0), Err(CoreError::InvalidTileSize));
    }
}
