//! Dense matrix and vector types.
//!
//! Both types own a single contiguous `Vec<f64>`. Matrices are stored in
//! row-major order, so element (i, j) lives at `i * cols + j` and a block of
//! consecutive rows is itself a contiguous slice. That is the layout the
//! distributed backends scatter, so no repacking happens before distribution.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::Serialize;

use crate::error::CoreError;

/// Allocate a zero-filled buffer, reporting failure instead of aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<f64>, CoreError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CoreError::Allocation { elements: len })?;
    buf.resize(len, 0.0);
    Ok(buf)
}

/// Number of elements in a `rows x cols` matrix, rejecting empty shapes and
/// sizes that overflow `usize`.
pub(crate) fn element_count(rows: usize, cols: usize) -> Result<usize, CoreError> {
    if rows == 0 || cols == 0 {
        return Err(CoreError::InvalidDimensions { rows, cols });
    }
    rows.checked_mul(cols).ok_or(CoreError::Allocation {
        elements: usize::MAX,
    })
}

/// A dense `rows x cols` matrix of `f64` in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Wrap an existing row-major buffer.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, CoreError> {
        let expected = element_count(rows, cols)?;
        if data.len() != expected {
            return Err(CoreError::ShapeMismatch {
                what: "matrix buffer",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// A zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self, CoreError> {
        let data = try_zeroed(element_count(rows, cols)?)?;
        Ok(Self { rows, cols, data })
    }

    /// The `n x n` identity matrix.
    pub fn identity(n: usize) -> Result<Self, CoreError> {
        let mut m = Self::zeros(n, n)?;
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        Ok(m)
    }

    /// Build a matrix by evaluating `f(i, j)` for every cell in row-major order.
    pub fn from_fn(
        rows: usize,
        cols: usize,
        mut f: impl FnMut(usize, usize) -> f64,
    ) -> Result<Self, CoreError> {
        let mut m = Self::zeros(rows, cols)?;
        for (idx, cell) in m.data.iter_mut().enumerate() {
            *cell = f(idx / cols, idx % cols);
        }
        Ok(m)
    }

    /// Build a matrix from a list of equally long rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, CoreError> {
        let cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        let total = element_count(rows.len(), cols)?;
        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| CoreError::Allocation { elements: total })?;
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(CoreError::ShapeMismatch {
                    what: "matrix row",
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The whole row-major buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Element (i, j). Panics when out of range, like slice indexing.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Row `i` as a slice of length `cols`.
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    /// `count` consecutive rows starting at `offset`, as one contiguous slice.
    ///
    /// A zero `count` yields an empty slice.
    pub fn row_block(&self, offset: usize, count: usize) -> &[f64] {
        let start = offset * self.cols;
        &self.data[start..start + count * self.cols]
    }

    /// Borrow the matrix as an `ndarray` view.
    pub fn view(&self) -> Result<ArrayView2<'_, f64>, CoreError> {
        ArrayView2::from_shape((self.rows, self.cols), &self.data).map_err(|_| {
            CoreError::ShapeMismatch {
                what: "matrix view",
                expected: self.rows * self.cols,
                actual: self.data.len(),
            }
        })
    }
}

impl TryFrom<Array2<f64>> for Matrix {
    type Error = CoreError;

    fn try_from(array: Array2<f64>) -> Result<Self, Self::Error> {
        let (rows, cols) = array.dim();
        // `iter` walks logical row-major order whatever the memory layout.
        let data: Vec<f64> = array.iter().copied().collect();
        Self::new(rows, cols, data)
    }
}

/// A dense vector of `f64`. Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    pub fn new(data: Vec<f64>) -> Result<Self, CoreError> {
        if data.is_empty() {
            return Err(CoreError::EmptyVector);
        }
        Ok(Self { data })
    }

    pub fn zeros(len: usize) -> Result<Self, CoreError> {
        if len == 0 {
            return Err(CoreError::EmptyVector);
        }
        Ok(Self {
            data: try_zeroed(len)?,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`: a vector holds at least one element.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        ArrayView1::from(&self.data[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_row_major_layout() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.get(2, 0), 5.0);
        assert_eq!(m.row_block(1, 2), &[3.0, 4.0, 5.0, 6.0]);
        assert!(m.row_block(3, 0).is_empty());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert_eq!(
            Matrix::new(0, 3, vec![]),
            Err(CoreError::InvalidDimensions { rows: 0, cols: 3 })
        );
        assert!(matches!(
            Matrix::new(2, 2, vec![1.0; 3]),
            Err(CoreError::ShapeMismatch { expected: 4, actual: 3, .. })
        ));
        assert!(matches!(
            Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]),
            Err(CoreError::ShapeMismatch { .. })
        ));
        assert_eq!(Vector::new(vec![]), Err(CoreError::EmptyVector));
        assert!(matches!(
            Matrix::zeros(usize::MAX, 2),
            Err(CoreError::Allocation { .. })
        ));
    }

    #[test]
    fn test_identity() {
        let m = Matrix::identity(3).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.get(i, j), if i == j { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_ndarray_interop() {
        // A transposed array has column-major memory; conversion must still
        // produce logical row-major order.
        let a = array![[1.0, 3.0, 5.0], [2.0, 4.0, 6.0]].reversed_axes();
        let m = Matrix::try_from(a.to_owned()).unwrap();
        assert_eq!(m.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let view = m.view().unwrap();
        assert_eq!(view[[2, 1]], 6.0);

        let v = Vector::new(vec![1.0, 1.0]).unwrap();
        assert_eq!(view.dot(&v.view()).to_vec(), vec![3.0, 7.0, 11.0]);
    }

    #[test]
    fn test_json_shape() {
        let v = Vector::new(vec![1.0, 2.5]).unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "[1.0,2.5]");

        let m = Matrix::identity(2).unwrap();
        let json: serde_json::Value = serde_json::to_value(&m).unwrap();
        assert_eq!(json["rows"], 2);
        assert_eq!(json["data"].as_array().unwrap().len(), 4);
    }
}
