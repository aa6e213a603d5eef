//! Errors raised while building inputs, planning partitions, or running a
//! kernel.

use thiserror::Error;

/// Configuration and allocation errors shared by every backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Matrix rows and columns must be greater than 0 (got {rows}x{cols})")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("Vector length must be greater than 0")]
    EmptyVector,

    #[error("Worker count must be greater than 0 (got {0})")]
    InvalidWorkerCount(usize),

    #[error("Tile size must be greater than 0")]
    InvalidTileSize,

    #[error("Matrix dimensions {rows}x{cols} must be divisible by tile size {tile}")]
    TileMismatch { rows: usize, cols: usize, tile: usize },

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Allocation failed for {elements} elements")]
    Allocation { elements: usize },
}
